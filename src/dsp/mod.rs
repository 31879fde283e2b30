//! DSP — Pure Rust cycle synthesis.
//!
//! Everything in here is deterministic and free of I/O: the same
//! descriptors, tempo and seed always produce the same PCM, which is what
//! lets a looping buffer be regenerated in place.

pub mod compressor;
pub mod descriptor;
pub mod envelope;
pub mod oscillator;
pub mod renderer;
pub mod synthesizer;

//! Playback — device submission queue and loop lifecycle.
//!
//! A [`PlaybackDevice`] takes ownership of each submitted buffer and gives
//! it back in a [`Completion`] once it has finished playing, been stopped,
//! or been discarded by `close`. [`LoopController`] builds the
//! single-loop start/replace/update/stop protocol on top.

#[cfg(feature = "cpal")]
pub mod cpal_output;
pub mod device;
pub mod looping;
pub mod queue;

#[cfg(feature = "cpal")]
pub use cpal_output::CpalOutput;
pub use device::{ManualClock, ManualOutput, OutputBackend, PlaybackDevice};
pub use looping::{LoopController, LoopState};
pub use queue::{Completion, CompletionStatus, QueueHandle, Repeat, SubmissionId};

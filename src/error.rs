use thiserror::Error;

use crate::dsp::synthesizer::PcmBuffer;

/// Errors raised while turning descriptors into PCM.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("Invalid tempo: {0}")]
    InvalidTempo(String),
    #[error("Invalid output format: {0}")]
    InvalidFormat(String),
    #[error("Failed to allocate a buffer of {samples} samples")]
    Allocation { samples: usize },
    #[error("{bytes} bytes of sample data do not fit in a WAV file")]
    WavTooLarge { bytes: usize },
}

/// Errors raised by the playback device and loop controller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("No audio output device available: {0}")]
    DeviceUnavailable(String),
    #[error("Playback device is not open")]
    DeviceNotOpen,
    #[error("Buffer does not match the device format: {0}")]
    InvalidBuffer(String),
    #[error("Repeat count must be at least 1")]
    InvalidRepeatCount,
    #[error("Unknown or already completed submission {0}")]
    UnknownSubmission(u64),
    #[error("No loop is playing")]
    NotLooping,
    #[error("Submission {0} is finite and cannot be stopped")]
    NotInfinite(u64),
}

/// A rejected enqueue. The buffer is handed back untouched.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct EnqueueError {
    pub reason: PlaybackError,
    pub buffer: PcmBuffer,
}

impl EnqueueError {
    /// Take the buffer back, dropping the reason.
    pub fn into_buffer(self) -> PcmBuffer {
        self.buffer
    }
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Failed to decode patch: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Top-level error for [`crate::engine::AudioEngine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Synthesis error: {0}")]
    Synth(#[from] SynthError),
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),
    #[error("Enqueue rejected: {0}")]
    Enqueue(#[from] EnqueueError),
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),
}

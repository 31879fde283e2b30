//! AudioEngine — owns the synthesizer, the output device and the loop
//! controller, and exposes the calls the UI layer makes.
//!
//! Synthesis works with or without a device. Playback calls fail fast with
//! `DeviceNotOpen` until [`AudioEngine::open_device`] succeeds.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::dsp::compressor::CompressorConfig;
use crate::dsp::descriptor::SoundDescriptor;
use crate::dsp::oscillator::DEFAULT_NOISE_SEED;
use crate::dsp::renderer::encode_wav;
use crate::dsp::synthesizer::{
    BITS_PER_SAMPLE, CHANNELS, DEFAULT_VOICE_GAIN, PcmBuffer, PcmFormat, SAMPLE_RATE, Synthesizer,
    Tempo,
};
use crate::error::{EngineError, EnqueueError, PatchError, PlaybackError, SynthError};
use crate::patch::Patch;
use crate::playback::{
    Completion, LoopController, LoopState, OutputBackend, PlaybackDevice, Repeat, SubmissionId,
};

// ── Configuration ───────────────────────────────────────────

/// Engine-wide settings. Every field has a default, so partial JSON works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Seed for the noise table; equal seeds give identical output.
    pub noise_seed: u64,
    /// Gain applied to the sum of all voices.
    pub voice_gain: f64,
    /// Disabled unless set.
    pub compressor: Option<CompressorConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            noise_seed: DEFAULT_NOISE_SEED,
            voice_gain: DEFAULT_VOICE_GAIN,
            compressor: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, PatchError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }
}

// ── Engine ──────────────────────────────────────────────────

pub struct AudioEngine {
    config: EngineConfig,
    synth: Synthesizer,
    device: Option<PlaybackDevice>,
    loops: LoopController,
    /// Caller-owned buffers recovered while replacing a device, handed out
    /// by the next `poll`/`close_device`.
    returned: VecDeque<Completion>,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::with_synthesizer(EngineConfig::default(), Synthesizer::default())
    }
}

impl AudioEngine {
    /// Fails with `InvalidFormat` when the configured rate or channel
    /// count cannot be rendered.
    pub fn new(config: EngineConfig) -> Result<Self, SynthError> {
        let synth = Synthesizer::new(config.format(), config.noise_seed)?
            .with_voice_gain(config.voice_gain)
            .with_compressor(config.compressor);
        Ok(Self::with_synthesizer(config, synth))
    }

    fn with_synthesizer(config: EngineConfig, synth: Synthesizer) -> Self {
        AudioEngine {
            config,
            synth,
            device: None,
            loops: LoopController::new(),
            returned: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synth
    }

    // ── Synthesis ──

    /// Render one cycle of `voices` at `tempo`.
    pub fn synthesize(&self, voices: &[SoundDescriptor], tempo: &Tempo) -> Result<PcmBuffer, SynthError> {
        self.synth.render(voices, tempo)
    }

    pub fn render_patch(&self, patch: &Patch) -> Result<PcmBuffer, SynthError> {
        self.synth.render(&patch.voices, &patch.tempo)
    }

    /// Render one cycle straight to WAV bytes.
    pub fn export_wav(&self, voices: &[SoundDescriptor], tempo: &Tempo) -> Result<Vec<u8>, SynthError> {
        encode_wav(&self.synthesize(voices, tempo)?)
    }

    // ── Device lifecycle ──

    /// Open `backend` in the engine's format. An already open device is
    /// closed first; its caller-owned buffers come back from the next
    /// `poll`.
    pub fn open_device(&mut self, backend: Box<dyn OutputBackend>) -> Result<(), PlaybackError> {
        if self.device.is_some() {
            let recovered = self.close_device();
            self.returned.extend(recovered);
        }
        self.device = Some(PlaybackDevice::open(self.synth.format(), backend)?);
        Ok(())
    }

    /// Open the host's default output through cpal.
    #[cfg(feature = "cpal")]
    pub fn open_default_device(&mut self) -> Result<(), PlaybackError> {
        self.open_device(Box::new(crate::playback::CpalOutput::new()))
    }

    /// Close the device and return every caller-owned buffer it still
    /// held. Loop buffers are released here.
    pub fn close_device(&mut self) -> Vec<Completion> {
        let mut out: Vec<Completion> = self.returned.drain(..).collect();
        if let Some(device) = self.device.take() {
            out.extend(device.close().into_iter().filter_map(|c| self.loops.observe(c)));
        }
        self.loops.reset();
        out
    }

    pub fn is_device_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.device.as_ref().map(PlaybackDevice::backend_name)
    }

    // ── Playback ──

    /// Play `buffer` `repeat_count` times. One completion is delivered
    /// once every pass has played. On failure the buffer comes back in
    /// the error.
    pub fn play_once(&mut self, buffer: PcmBuffer, repeat_count: u32) -> Result<SubmissionId, EnqueueError> {
        let Some(device) = self.device.as_ref() else {
            return Err(EnqueueError {
                reason: PlaybackError::DeviceNotOpen,
                buffer,
            });
        };
        device.enqueue(buffer, Repeat::Times(repeat_count))
    }

    /// Render `voices` and loop them, replacing any current loop.
    pub fn start_loop(&mut self, voices: &[SoundDescriptor], tempo: &Tempo) -> Result<SubmissionId, EngineError> {
        let device = self.device.as_ref().ok_or(PlaybackError::DeviceNotOpen)?;
        let buffer = self.synth.render(voices, tempo)?;
        Ok(self.loops.start_loop(device, buffer)?)
    }

    /// Re-render the current loop. When the cycle length is unchanged the
    /// samples are overwritten in place and playback continues from the
    /// same position; otherwise the loop is replaced.
    pub fn update_loop(&mut self, voices: &[SoundDescriptor], tempo: &Tempo) -> Result<SubmissionId, EngineError> {
        let device = self.device.as_ref().ok_or(PlaybackError::DeviceNotOpen)?;
        let id = self.loops.current().ok_or(PlaybackError::NotLooping)?;
        let scratch = self.synth.render(voices, tempo)?;
        match self.loops.update_loop(device, scratch.samples()) {
            Ok(()) => Ok(id),
            Err(PlaybackError::InvalidBuffer(reason)) => {
                log::debug!("Loop {id} cannot be updated in place ({reason}), replacing");
                Ok(self.loops.start_loop(device, scratch)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Request the current loop to stop. Its buffer is released once the
    /// completion is seen by `poll`.
    pub fn stop_loop(&mut self) -> Result<(), EngineError> {
        let device = self.device.as_ref().ok_or(PlaybackError::DeviceNotOpen)?;
        self.loops.stop_loop(device)?;
        Ok(())
    }

    pub fn is_looping(&self) -> bool {
        self.loops.is_looping()
    }

    pub fn loop_state(&self) -> LoopState {
        self.loops.state()
    }

    pub fn loop_controller(&self) -> &LoopController {
        &self.loops
    }

    /// Number of submissions still owned by the device.
    pub fn pending_count(&self) -> usize {
        self.device.as_ref().map_or(0, PlaybackDevice::pending_count)
    }

    // ── Completions ──

    /// Collect completions without blocking. Loop completions are consumed
    /// internally; everything returned is a buffer from `play_once`.
    pub fn poll(&mut self) -> Vec<Completion> {
        let mut out: Vec<Completion> = self.returned.drain(..).collect();
        if let Some(device) = self.device.as_ref() {
            while let Some(c) = device.try_completion() {
                out.extend(self.loops.observe(c));
            }
        }
        out
    }

    /// Wait up to `timeout` for the next `play_once` completion, releasing
    /// any loop buffers that finish in the meantime.
    pub fn wait_completion(&mut self, timeout: Duration) -> Option<Completion> {
        if let Some(c) = self.returned.pop_front() {
            return Some(c);
        }
        let device = self.device.as_ref()?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let c = device.recv_completion_timeout(remaining)?;
            if let Some(c) = self.loops.observe(c) {
                return Some(c);
            }
        }
    }
}

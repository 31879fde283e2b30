//! Buffer synthesizer — renders descriptors across one musical cycle into
//! interleaved 16-bit PCM.

use serde::{Deserialize, Serialize};

use crate::error::SynthError;

use super::compressor::{Compressor, CompressorConfig};
use super::descriptor::SoundDescriptor;
use super::oscillator::NoiseTable;

/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;
/// Interleaved output channels.
pub const CHANNELS: u16 = 2;
pub const BITS_PER_SAMPLE: u16 = 16;
/// Per-voice normalization so stacked voices do not clip.
pub const DEFAULT_VOICE_GAIN: f64 = 1.0 / 3.0;
/// Largest magnitude written to a sample.
pub const PCM_PEAK: f64 = 32767.0;
/// Highest accepted sample rate in Hz.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

// ── Formats ─────────────────────────────────────────────────

/// Layout of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        PcmFormat {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }
}

impl PcmFormat {
    pub fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample / 8
    }

    /// Only 16-bit samples with a nonzero channel count and a rate in
    /// `1..=MAX_SAMPLE_RATE` can be produced.
    pub fn validate(&self) -> Result<(), SynthError> {
        if self.bits_per_sample != BITS_PER_SAMPLE {
            return Err(SynthError::InvalidFormat(format!(
                "{} bits per sample (only 16 is supported)",
                self.bits_per_sample
            )));
        }
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE || self.channels == 0 {
            return Err(SynthError::InvalidFormat(format!(
                "{} Hz, {} channels",
                self.sample_rate, self.channels
            )));
        }
        Ok(())
    }
}

/// Length of one generated cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tempo {
    pub beats_per_minute: f64,
    pub measures: u32,
    pub beats_per_measure: u32,
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo {
            beats_per_minute: 120.0,
            measures: 1,
            beats_per_measure: 1,
        }
    }
}

impl Tempo {
    pub fn new(beats_per_minute: f64, measures: u32, beats_per_measure: u32) -> Self {
        Tempo {
            beats_per_minute,
            measures,
            beats_per_measure,
        }
    }

    pub fn beat_duration_secs(&self) -> f64 {
        60.0 / self.beats_per_minute
    }

    /// `measures · beats_per_measure · 60 / bpm`.
    pub fn cycle_duration_secs(&self) -> f64 {
        (self.measures as f64) * (self.beats_per_measure as f64) * self.beat_duration_secs()
    }

    pub fn validate(&self) -> Result<(), SynthError> {
        if !self.beats_per_minute.is_finite() || self.beats_per_minute <= 0.0 {
            return Err(SynthError::InvalidTempo(format!(
                "{} beats per minute",
                self.beats_per_minute
            )));
        }
        if self.measures == 0 || self.beats_per_measure == 0 {
            return Err(SynthError::InvalidTempo(format!(
                "{} measures of {} beats",
                self.measures, self.beats_per_measure
            )));
        }
        Ok(())
    }
}

// ── PCM Buffer ──────────────────────────────────────────────

/// Owned interleaved 16-bit samples tagged with their format.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl PcmBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        PcmBuffer {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    /// Total interleaved samples (all channels).
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate.max(1) as f64
    }

    /// Little-endian byte image of the samples.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

// ── Synthesizer ─────────────────────────────────────────────

/// Renders descriptor stacks into [`PcmBuffer`]s.
///
/// Holds the noise table, so two synthesizers built with the same seed
/// produce bit-identical output.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    format: PcmFormat,
    noise: NoiseTable,
    voice_gain: f64,
    compressor: Option<CompressorConfig>,
}

impl Synthesizer {
    /// The noise table holds one second of values, so the format is
    /// checked before it is built.
    pub fn new(format: PcmFormat, noise_seed: u64) -> Result<Self, SynthError> {
        format.validate()?;
        Ok(Self::build(format, noise_seed))
    }

    fn build(format: PcmFormat, noise_seed: u64) -> Self {
        Synthesizer {
            format,
            noise: NoiseTable::new(noise_seed, format.sample_rate as usize),
            voice_gain: DEFAULT_VOICE_GAIN,
            compressor: None,
        }
    }

    pub fn with_voice_gain(mut self, voice_gain: f64) -> Self {
        self.voice_gain = voice_gain;
        self
    }

    pub fn with_compressor(mut self, compressor: Option<CompressorConfig>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn noise(&self) -> &NoiseTable {
        &self.noise
    }

    /// Interleaved samples in one cycle: whole frames, so every channel
    /// gets the same number of samples.
    ///
    /// This is `round(sample_rate · cycle) · channels`, which can differ by
    /// one frame from `round(sample_rate · channels · cycle)` when the
    /// cycle does not land on a frame boundary.
    pub fn sample_count(&self, tempo: &Tempo) -> Result<usize, SynthError> {
        self.format.validate()?;
        tempo.validate()?;
        let frames = (self.format.sample_rate as f64 * tempo.cycle_duration_secs()).round();
        let count = frames * self.format.channels as f64;
        if !count.is_finite() || count > isize::MAX as f64 / 2.0 {
            return Err(SynthError::Allocation {
                samples: usize::MAX,
            });
        }
        Ok(count as usize)
    }

    /// Render a fresh buffer for `voices` (summed in order) over one cycle.
    pub fn render(&self, voices: &[SoundDescriptor], tempo: &Tempo) -> Result<PcmBuffer, SynthError> {
        let count = self.sample_count(tempo)?;
        let mut samples: Vec<i16> = Vec::new();
        samples
            .try_reserve_exact(count)
            .map_err(|_| SynthError::Allocation { samples: count })?;
        samples.resize(count, 0);
        self.render_into(&mut samples, voices, tempo)?;
        Ok(PcmBuffer::new(
            samples,
            self.format.sample_rate,
            self.format.channels,
        ))
    }

    /// Overwrite `out` with the cycle. Sample `i` is taken at
    /// `t = i / (channels · sample_rate)`, wrapped into the cycle.
    pub fn render_into(
        &self,
        out: &mut [i16],
        voices: &[SoundDescriptor],
        tempo: &Tempo,
    ) -> Result<(), SynthError> {
        self.format.validate()?;
        tempo.validate()?;

        let voices: Vec<SoundDescriptor> = voices.iter().map(SoundDescriptor::normalized).collect();
        let cycle = tempo.cycle_duration_secs();
        let rate = self.format.sample_rate as f64 * self.format.channels as f64;
        let mut compressor = self
            .compressor
            .as_ref()
            .map(|c| Compressor::new(c, self.format.sample_rate));

        for (i, slot) in out.iter_mut().enumerate() {
            let t = i as f64 / rate;
            let period = (t / cycle).fract();
            let time = period * cycle;
            let mut mixed: f64 = voices
                .iter()
                .map(|v| v.evaluate(period, time, &self.noise))
                .sum::<f64>()
                * self.voice_gain;
            if let Some(comp) = compressor.as_mut() {
                mixed = comp.process(mixed);
            }
            *slot = to_pcm(mixed);
        }
        Ok(())
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Synthesizer::build(PcmFormat::default(), super::oscillator::DEFAULT_NOISE_SEED)
    }
}

/// Scale to 16-bit and clamp to `±32767`.
pub fn to_pcm(x: f64) -> i16 {
    (x * PCM_PEAK).clamp(-PCM_PEAK, PCM_PEAK) as i16
}

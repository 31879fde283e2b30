//! SoundDescriptor — declarative parameters for one synthesized voice.
//!
//! A descriptor is evaluated per sample: the frequency and amplitude are
//! swept between their `*_min` and base values across a window of the
//! cycle, then multiplied by the voice envelope and the selected generator.

use serde::{Deserialize, Serialize};

use super::envelope::Envelope;
use super::oscillator::{NoiseTable, Waveform};

/// How a parameter is swept from its minimum to its base value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    /// No sweep: the base value is used for the whole cycle.
    #[default]
    None,
    Linear,
    /// Fast start, slow finish.
    SquareRoot,
    /// Slow start, fast finish.
    Quadratic,
}

impl Modifier {
    pub fn id(self) -> u32 {
        match self {
            Modifier::None => 0,
            Modifier::Linear => 1,
            Modifier::SquareRoot => 2,
            Modifier::Quadratic => 3,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Modifier::None),
            1 => Some(Modifier::Linear),
            2 => Some(Modifier::SquareRoot),
            3 => Some(Modifier::Quadratic),
            _ => None,
        }
    }

    /// Shape a linear progress in `[0, 1]`. `None` means "do not sweep".
    pub fn curve(self, progress: f64) -> Option<f64> {
        match self {
            Modifier::None => None,
            Modifier::Linear => Some(progress),
            Modifier::SquareRoot => Some(progress.sqrt()),
            Modifier::Quadratic => Some(progress * progress),
        }
    }
}

/// Fraction-of-cycle window over which a sweep runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    pub begin: f64,
    pub end: f64,
}

impl Default for SweepRange {
    fn default() -> Self {
        SweepRange {
            begin: 0.0,
            end: 1.0,
        }
    }
}

impl SweepRange {
    pub fn new(begin: f64, end: f64) -> Self {
        SweepRange { begin, end }.normalized()
    }

    /// Clamp both ends to `[0, 1]` and keep `begin <= end`.
    pub fn normalized(self) -> Self {
        let begin = unit(self.begin);
        let end = unit(self.end).max(begin);
        SweepRange { begin, end }
    }

    /// Linear progress of `period` through the window, clamped to the
    /// nearer endpoint outside it. A zero-width window is a step.
    pub fn progress(&self, period: f64) -> f64 {
        let width = self.end - self.begin;
        if width <= 0.0 {
            return if period < self.begin { 0.0 } else { 1.0 };
        }
        ((period - self.begin) / width).clamp(0.0, 1.0)
    }
}

/// One instrument voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundDescriptor {
    pub waveform: Waveform,
    pub amplitude: f64,
    pub amplitude_min: f64,
    /// Base pitch in Hz for the tonal waveforms. For the kick it counts
    /// boom oscillations per cycle.
    pub frequency: f64,
    pub frequency_min: f64,
    pub frequency_modifier: Modifier,
    pub amplitude_modifier: Modifier,
    pub frequency_modifier_range: SweepRange,
    pub amplitude_modifier_range: SweepRange,
    pub envelope: Envelope,
}

impl Default for SoundDescriptor {
    fn default() -> Self {
        SoundDescriptor {
            waveform: Waveform::Kick,
            amplitude: 1.0,
            amplitude_min: 0.0,
            frequency: 60.0,
            frequency_min: 60.0,
            frequency_modifier: Modifier::None,
            amplitude_modifier: Modifier::None,
            frequency_modifier_range: SweepRange::default(),
            amplitude_modifier_range: SweepRange::default(),
            envelope: Envelope::default(),
        }
    }
}

impl SoundDescriptor {
    pub fn new(waveform: Waveform, frequency: f64, amplitude: f64) -> Self {
        SoundDescriptor {
            waveform,
            frequency,
            frequency_min: frequency,
            amplitude,
            ..SoundDescriptor::default()
        }
    }

    /// Select the generator by numeric id; unknown ids keep the kick.
    pub fn with_waveform_id(mut self, id: u32) -> Self {
        self.waveform = Waveform::from_id(id).unwrap_or_else(|| {
            log::debug!("Unknown waveform id {id}, using kick");
            Waveform::Kick
        });
        self
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    /// Sweep the pitch from `min` up to the base frequency over `range`.
    pub fn with_frequency_sweep(mut self, min: f64, modifier: Modifier, range: SweepRange) -> Self {
        self.frequency_min = min;
        self.frequency_modifier = modifier;
        self.frequency_modifier_range = range;
        self
    }

    /// Sweep the gain from `min` up to the base amplitude over `range`.
    pub fn with_amplitude_sweep(mut self, min: f64, modifier: Modifier, range: SweepRange) -> Self {
        self.amplitude_min = min;
        self.amplitude_modifier = modifier;
        self.amplitude_modifier_range = range;
        self
    }

    pub fn waveform_id(&self) -> u32 {
        self.waveform.id()
    }

    /// Copy with the envelope ordered, sweep windows inside `[0, 1]` and
    /// non-finite or negative pitch/gain values zeroed.
    pub fn normalized(&self) -> Self {
        SoundDescriptor {
            waveform: self.waveform,
            amplitude: non_negative(self.amplitude),
            amplitude_min: non_negative(self.amplitude_min),
            frequency: non_negative(self.frequency),
            frequency_min: non_negative(self.frequency_min),
            frequency_modifier: self.frequency_modifier,
            amplitude_modifier: self.amplitude_modifier,
            frequency_modifier_range: self.frequency_modifier_range.normalized(),
            amplitude_modifier_range: self.amplitude_modifier_range.normalized(),
            envelope: self.envelope.normalized(),
        }
    }

    pub fn frequency_at(&self, period: f64) -> f64 {
        swept(
            self.frequency_min,
            self.frequency,
            self.frequency_modifier,
            &self.frequency_modifier_range,
            period,
        )
    }

    pub fn amplitude_at(&self, period: f64) -> f64 {
        swept(
            self.amplitude_min,
            self.amplitude,
            self.amplitude_modifier,
            &self.amplitude_modifier_range,
            period,
        )
    }

    /// One sample of this voice at cycle position `period`, `time`
    /// seconds into the cycle.
    ///
    /// Expects a normalized descriptor; see [`SoundDescriptor::normalized`].
    pub fn evaluate(&self, period: f64, time: f64, noise: &NoiseTable) -> f64 {
        let frequency = self.frequency_at(period);
        let amplitude = self.amplitude_at(period);
        amplitude * self.envelope.gain(period) * self.waveform.sample(period, time, frequency, noise)
    }
}

/// Linear interpolation from `v0` (x = 0) to `v1` (x = 1).
pub fn lerp(v0: f64, v1: f64, x: f64) -> f64 {
    v0 + (v1 - v0) * x
}

fn swept(min: f64, base: f64, modifier: Modifier, range: &SweepRange, period: f64) -> f64 {
    match modifier.curve(range.progress(period)) {
        Some(x) => lerp(min, base, x),
        None => base,
    }
}

fn unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

fn non_negative(x: f64) -> f64 {
    if x.is_finite() { x.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::Adsr;
    use crate::dsp::oscillator::DEFAULT_NOISE_SEED;

    #[test]
    fn no_modifier_ignores_min() {
        let d = SoundDescriptor::new(Waveform::Sine, 440.0, 0.8)
            .with_frequency_sweep(110.0, Modifier::None, SweepRange::new(0.0, 1.0));
        assert_eq!(d.frequency_at(0.0), 440.0);
        assert_eq!(d.frequency_at(0.5), 440.0);
        assert_eq!(d.amplitude_at(0.9), 0.8);
    }

    #[test]
    fn linear_sweep_inside_window() {
        let d = SoundDescriptor::new(Waveform::Sine, 400.0, 1.0)
            .with_frequency_sweep(200.0, Modifier::Linear, SweepRange::new(0.25, 0.75));
        assert_eq!(d.frequency_at(0.0), 200.0);
        assert_eq!(d.frequency_at(0.25), 200.0);
        assert!((d.frequency_at(0.5) - 300.0).abs() < 1e-9);
        assert_eq!(d.frequency_at(0.75), 400.0);
        assert_eq!(d.frequency_at(0.99), 400.0);
    }

    #[test]
    fn curved_sweeps() {
        let range = SweepRange::new(0.0, 1.0);
        let d = SoundDescriptor::new(Waveform::Sine, 1.0, 1.0)
            .with_amplitude_sweep(0.0, Modifier::Quadratic, range);
        assert!((d.amplitude_at(0.5) - 0.25).abs() < 1e-12);
        let d = d.with_amplitude_sweep(0.0, Modifier::SquareRoot, range);
        assert!((d.amplitude_at(0.25) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_width_window_is_a_step() {
        let r = SweepRange::new(0.5, 0.5);
        assert_eq!(r.progress(0.49), 0.0);
        assert_eq!(r.progress(0.5), 1.0);
    }

    #[test]
    fn normalization_clamps_ranges_and_envelope() {
        let d = SoundDescriptor {
            frequency: -5.0,
            amplitude: f64::NAN,
            frequency_modifier_range: SweepRange {
                begin: 0.8,
                end: 0.2,
            },
            amplitude_modifier_range: SweepRange {
                begin: -1.0,
                end: 3.0,
            },
            envelope: Envelope::Adsr(Adsr {
                attack: 0.6,
                decay: 0.1,
                sustain: 2.0,
                release: 0.3,
            }),
            ..SoundDescriptor::default()
        }
        .normalized();
        assert_eq!(d.frequency, 0.0);
        assert_eq!(d.amplitude, 0.0);
        assert_eq!(d.frequency_modifier_range, SweepRange { begin: 0.8, end: 0.8 });
        assert_eq!(d.amplitude_modifier_range, SweepRange { begin: 0.0, end: 1.0 });
        match d.envelope {
            Envelope::Adsr(a) => assert!(a.is_normalized()),
            other => panic!("Unexpected envelope {other:?}"),
        }
    }

    #[test]
    fn evaluate_applies_envelope_and_gain() {
        let noise = NoiseTable::new(DEFAULT_NOISE_SEED, 1000);
        let d = SoundDescriptor::new(Waveform::Square, 1.0, 0.5).with_envelope(Envelope::Flat);
        assert_eq!(d.evaluate(0.5, 0.1, &noise), -0.5);
        assert_eq!(d.evaluate(0.5, 0.9, &noise), 0.5);

        let quiet = d.clone().with_envelope(Envelope::Quadratic);
        assert_eq!(quiet.evaluate(0.0, 0.1, &noise), 0.0);
    }

    #[test]
    fn unknown_waveform_id_keeps_kick() {
        let d = SoundDescriptor::default().with_waveform_id(2);
        assert_eq!(d.waveform, Waveform::Square);
        let d = d.with_waveform_id(42);
        assert_eq!(d.waveform_id(), 0);
    }

    #[test]
    fn descriptor_json_defaults() {
        let d: SoundDescriptor =
            serde_json::from_str(r#"{"waveform":"sine","frequency":220.0}"#).unwrap();
        assert_eq!(d.waveform, Waveform::Sine);
        assert_eq!(d.frequency, 220.0);
        assert_eq!(d.amplitude, 1.0);
        assert_eq!(d.frequency_modifier, Modifier::None);
    }

    #[test]
    fn modifier_ids() {
        for m in [Modifier::None, Modifier::Linear, Modifier::SquareRoot, Modifier::Quadratic] {
            assert_eq!(Modifier::from_id(m.id()), Some(m));
        }
        assert_eq!(Modifier::from_id(4), None);
    }
}

//! Stateless signal generators.
//!
//! Each generator maps `(t, frequency)` straight to an amplitude, with no
//! running phase, so any sample of a buffer can be computed in isolation.
//! Tonal generators take `t` in seconds; the kick is shaped over the cycle
//! and takes the cycle position.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Seed used for the engine's noise table.
pub const DEFAULT_NOISE_SEED: u64 = 42;

/// Generator selected by a descriptor's waveform id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    /// Composite percussive voice built from sine + noise.
    #[default]
    Kick,
    Sine,
    Square,
    Noise,
}

impl Waveform {
    /// Numeric id as exposed to the UI layer.
    pub fn id(self) -> u32 {
        match self {
            Waveform::Kick => 0,
            Waveform::Sine => 1,
            Waveform::Square => 2,
            Waveform::Noise => 3,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Waveform::Kick),
            1 => Some(Waveform::Sine),
            2 => Some(Waveform::Square),
            3 => Some(Waveform::Noise),
            _ => None,
        }
    }

    /// Evaluate this generator at cycle position `period`, which lies
    /// `time` seconds into the cycle.
    pub fn sample(self, period: f64, time: f64, frequency: f64, noise: &NoiseTable) -> f64 {
        match self {
            Waveform::Kick => kick(period, frequency, noise),
            Waveform::Sine => sine(time, frequency),
            Waveform::Square => square(time, frequency, 0.5),
            Waveform::Noise => noise.sample(time, frequency),
        }
    }
}

/// `sin(2π·f·t)`.
pub fn sine(t: f64, frequency: f64) -> f64 {
    (2.0 * PI * frequency * t).sin()
}

/// -1 for the first `duty` fraction of each cycle, +1 for the rest.
pub fn square(t: f64, frequency: f64, duty: f64) -> f64 {
    if (t * frequency).fract() < duty { -1.0 } else { 1.0 }
}

/// Precomputed uniform noise in `[-1, 1]`, reproducible from its seed.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseTable {
    seed: u64,
    values: Vec<f64>,
}

impl NoiseTable {
    /// Fill a table of `len` values from `seed`. `len` is clamped to at
    /// least one entry.
    pub fn new(seed: u64, len: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let values = (0..len.max(1)).map(|_| rng.gen_range(-1.0..=1.0)).collect();
        NoiseTable { seed, values }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `floor(t·f)`, wrapped to the table length.
    pub fn sample(&self, t: f64, frequency: f64) -> f64 {
        let pos = (t * frequency).floor();
        if !pos.is_finite() {
            return 0.0;
        }
        let index = (pos as i64).rem_euclid(self.values.len() as i64) as usize;
        self.values[index]
    }
}

/// Percussive kick: decaying low sine plus two short noise bursts.
///
/// `frequency` scales the boom's pitch sweep in oscillations per cycle, so
/// the kick keeps its shape at any tempo. 60 gives the classic voice.
pub fn kick(period: f64, frequency: f64, noise: &NoiseTable) -> f64 {
    let boom_env = (-1.5 * period).exp();
    let pitch_falloff = (-0.45 * period).exp();
    let boom = boom_env * (2.0 * PI * frequency * pitch_falloff).sin();

    let burst_t = period * 400.0;
    let punch = ((-0.95 * burst_t).exp() * noise.sample(period, 240.0) * 0.7).clamp(-0.7, 0.7);
    let slap = ((-0.25 * burst_t).exp() * noise.sample(period, 5000.0) * 0.3).clamp(-0.3, 0.3);

    boom + punch + slap
}

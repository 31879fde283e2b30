//! Compressor — peak-hold gain reduction for stacked voices.
//!
//! Tracks a decaying peak of the mixed signal; while the peak sits above
//! the threshold every sample is divided by a fixed reduction factor.

use serde::{Deserialize, Serialize};

/// Configuration for the peak compressor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorConfig {
    /// Linear peak level above which reduction kicks in.
    pub threshold: f64,
    /// Divisor applied while compressing (4.0 = quarter level).
    pub reduction: f64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        CompressorConfig {
            threshold: 0.8,
            reduction: 4.0,
        }
    }
}

/// Running compressor state for one render pass.
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold: f64,
    reduction: f64,
    /// Amount the held peak falls per sample.
    decay: f64,
    peak: f64,
}

impl Compressor {
    /// The held peak falls by `1 / (2 · sample_rate)` per sample.
    pub fn new(config: &CompressorConfig, sample_rate: u32) -> Self {
        Compressor {
            threshold: config.threshold.max(0.0),
            reduction: config.reduction.max(1.0),
            decay: 1.0 / (2.0 * sample_rate.max(1) as f64),
            peak: 0.0,
        }
    }

    pub fn process(&mut self, x: f64) -> f64 {
        self.peak = self.peak.max(x.abs());
        let out = if self.peak > self.threshold {
            x / self.reduction
        } else {
            x
        };
        self.peak -= self.decay;
        out
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }
}

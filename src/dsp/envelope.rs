//! Cycle envelopes.
//!
//! Every envelope here is a pure function of the normalized position
//! within one repeating cycle (`period` in `[0, 1)`), so a buffer can be
//! regenerated at any time and loop seamlessly.

use serde::{Deserialize, Serialize};

/// ADSR thresholds expressed as positions along the cycle.
///
/// `attack`, `decay` and `release` are points in `[0, 1]` with
/// `attack <= decay <= release`; `sustain` is a level in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Adsr {
    /// Build a normalized ADSR. Out-of-order thresholds are pulled forward
    /// so the shape is always well defined.
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Adsr {
            attack,
            decay,
            sustain,
            release,
        }
        .normalized()
    }

    /// Clamp every field to `[0, 1]` and enforce `attack <= decay <= release`.
    pub fn normalized(self) -> Self {
        let attack = unit(self.attack);
        let decay = unit(self.decay).max(attack);
        let release = unit(self.release).max(decay);
        Adsr {
            attack,
            decay,
            sustain: unit(self.sustain),
            release,
        }
    }

    pub fn is_normalized(&self) -> bool {
        *self == self.normalized()
    }

    /// Gain at `period`.
    pub fn gain(&self, period: f64) -> f64 {
        env_adsr(period, self.attack, self.decay, self.sustain, self.release)
    }
}

impl Default for Adsr {
    /// The start-up shape: fast attack, short fall to full sustain.
    fn default() -> Self {
        Adsr::new(0.01, 0.2, 1.0, 0.0)
    }
}

/// Envelope shape applied to one voice over the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum Envelope {
    Adsr(Adsr),
    /// `sqrt(2p)` folded around the midpoint.
    SquareRoot,
    /// `4p²` folded around the midpoint.
    Quadratic,
    /// Constant unity gain.
    Flat,
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope::Adsr(Adsr::default())
    }
}

impl Envelope {
    pub fn normalized(self) -> Self {
        match self {
            Envelope::Adsr(adsr) => Envelope::Adsr(adsr.normalized()),
            other => other,
        }
    }

    pub fn gain(&self, period: f64) -> f64 {
        match self {
            Envelope::Adsr(adsr) => adsr.gain(period),
            Envelope::SquareRoot => env_square_root(period),
            Envelope::Quadratic => env_quadratic(period),
            Envelope::Flat => 1.0,
        }
    }
}

/// Piecewise-linear ADSR over the cycle.
///
/// Callers are expected to pass normalized thresholds (see
/// [`Adsr::normalized`]). An `attack` of zero means the note starts at
/// full gain.
pub fn env_adsr(period: f64, attack: f64, decay: f64, sustain: f64, release: f64) -> f64 {
    if period <= attack {
        if attack <= 0.0 {
            1.0
        } else {
            period / attack
        }
    } else if period <= decay {
        // Written so that `period == decay` lands exactly on `sustain`.
        let remaining = (decay - period) / (decay - attack);
        sustain + (1.0 - sustain) * remaining
    } else if period <= release {
        sustain
    } else {
        sustain - sustain * (period - release) / (1.0 - release)
    }
}

/// `sqrt(2p)` with `p = min(period, 1 - period)`.
pub fn env_square_root(period: f64) -> f64 {
    (2.0 * fold(period)).sqrt()
}

/// `4p²` with `p = min(period, 1 - period)`.
pub fn env_quadratic(period: f64) -> f64 {
    let p = fold(period);
    4.0 * p * p
}

fn fold(period: f64) -> f64 {
    if period < 0.5 { period } else { 1.0 - period }
}

fn unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_is_linear_ramp() {
        let adsr = Adsr::new(0.2, 0.5, 0.6, 0.8);
        for i in 0..200 {
            let period = 0.2 * i as f64 / 200.0;
            let g = adsr.gain(period);
            assert!(
                (g - period / 0.2).abs() < 1e-12,
                "Attack should be period/attack at {period}, got {g}"
            );
        }
    }

    #[test]
    fn zero_attack_starts_at_full_gain() {
        let adsr = Adsr::new(0.0, 0.5, 0.5, 0.8);
        assert_eq!(adsr.gain(0.0), 1.0);
    }

    #[test]
    fn boundaries_land_on_sustain() {
        let (a, d, s, r) = (0.1, 0.3, 0.37, 0.7);
        assert_eq!(env_adsr(d, a, d, s, r), s);
        assert_eq!(env_adsr(r, a, d, s, r), s);
        assert_eq!(env_adsr(a, a, d, s, r), 1.0);
    }

    #[test]
    fn release_falls_to_zero() {
        let adsr = Adsr::new(0.1, 0.2, 0.5, 0.6);
        assert!((adsr.gain(0.8) - 0.25).abs() < 1e-12);
        assert!(adsr.gain(0.999_999) < 1e-5);
    }

    #[test]
    fn normalization_orders_thresholds() {
        let adsr = Adsr::new(0.5, 0.2, 1.5, 0.1);
        assert_eq!(adsr.attack, 0.5);
        assert_eq!(adsr.decay, 0.5);
        assert_eq!(adsr.release, 0.5);
        assert_eq!(adsr.sustain, 1.0);
        assert!(adsr.is_normalized());

        let raw = Adsr {
            attack: f64::NAN,
            decay: -1.0,
            sustain: 0.5,
            release: 2.0,
        };
        let n = raw.normalized();
        assert_eq!((n.attack, n.decay, n.release), (0.0, 0.0, 1.0));
    }

    #[test]
    fn gain_stays_in_unit_range() {
        let adsr = Adsr::new(0.05, 0.4, 0.3, 0.9);
        for i in 0..10_000 {
            let p = i as f64 / 10_000.0;
            for env in [
                Envelope::Adsr(adsr),
                Envelope::SquareRoot,
                Envelope::Quadratic,
                Envelope::Flat,
            ] {
                let g = env.gain(p);
                assert!((0.0..=1.0).contains(&g), "{env:?} out of range at {p}: {g}");
            }
        }
    }

    #[test]
    fn symmetric_envelopes_peak_at_midpoint() {
        assert!((env_square_root(0.5) - 1.0).abs() < 1e-12);
        assert!((env_quadratic(0.5) - 1.0).abs() < 1e-12);
        assert_eq!(env_quadratic(0.0), 0.0);
        assert!((env_square_root(0.25) - env_square_root(0.75)).abs() < 1e-12);
        assert!((env_quadratic(0.1) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn envelope_serde_uses_shape_tag() {
        let env: Envelope = serde_json::from_str(
            r#"{"shape":"adsr","attack":0.1,"decay":0.2,"sustain":0.5,"release":0.9}"#,
        )
        .unwrap();
        assert_eq!(env, Envelope::Adsr(Adsr::new(0.1, 0.2, 0.5, 0.9)));
        let q: Envelope = serde_json::from_str(r#"{"shape":"quadratic"}"#).unwrap();
        assert_eq!(q, Envelope::Quadratic);
    }
}

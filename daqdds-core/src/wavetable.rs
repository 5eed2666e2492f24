//! Standard single-period wavetables for the DDS engine.
//!
//! Any table works with [`crate::dds::Dds`]; these are the shapes the CLI
//! offers out of the box. Tables are generated in any float precision via
//! `num_traits::Float` so callers with `f32` device paths can reuse them.

use alloc::vec::Vec;

use num_traits::Float;

use crate::dsp::{clamp, sin, wrap_phase01, TAU};

/// Table shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wave { Sine, Tri, Saw }

impl Wave {
    /// Shape value at a phase in [0, 1), in [-1, 1].
    #[inline]
    pub fn sample(self, phase01: f64) -> f64 {
        let p = wrap_phase01(phase01);
        match self {
            Wave::Sine => sin(TAU * p),
            // starts at 0 and rises, in phase with the sine
            Wave::Tri  => if p < 0.25 { 4.0 * p } else if p < 0.75 { 2.0 - 4.0 * p } else { 4.0 * p - 4.0 },
            Wave::Saw  => 2.0 * p - 1.0,
        }
    }

    /// One period sampled at `n` points, scaled by `amplitude`.
    pub fn table<T: Float>(self, n: usize, amplitude: f64) -> Vec<T> {
        (0..n)
            .map(|x| {
                let y = clamp(self.sample(x as f64 / n as f64), -1.0, 1.0) * amplitude;
                T::from(y).unwrap_or_else(T::zero)
            })
            .collect()
    }
}

impl core::str::FromStr for Wave {
    type Err = UnknownWave;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let is = |names: &[&str]| names.iter().any(|n| n.eq_ignore_ascii_case(s));
        if is(&["sine", "sin"]) {
            Ok(Wave::Sine)
        } else if is(&["tri", "triangle"]) {
            Ok(Wave::Tri)
        } else if is(&["saw", "sawtooth"]) {
            Ok(Wave::Saw)
        } else {
            Err(UnknownWave)
        }
    }
}

/// Returned when a wave name is not one of `sine`, `tri`, `saw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown waveform (expected sine, tri or saw)")]
pub struct UnknownWave;

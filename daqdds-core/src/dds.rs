//! Direct digital synthesis: a stored table traversed at an arbitrary rate.
//!
//! A [`Dds`] owns a table of `N` samples and produces, per request of `n`
//! samples, the next `n` samples of that table read so that `waveform_rate`
//! full traversals happen per second at `sample_rate`. Resampling is
//! nearest-neighbor (floor of the fractional position); there is no
//! interpolation.
//!
//! # Phase accumulator
//!
//! The table position advances by `skip_factor = Ws * N / Fs` per sample.
//! Instead of multiplying an ever-growing sample counter by a fractional
//! `skip_factor` (which loses precision once the counter gets large), the
//! position is an integer phase measured in `1 / (Fs * 2^32)` table positions:
//!
//! - tuning word `step = round(Ws * N * 2^32)` added once per sample,
//! - phase kept modulo `N * Fs * 2^32`,
//! - table index `phase / (Fs * 2^32)`, always in `[0, N)`.
//!
//! Whenever `Ws * N` has at most 32 fractional bits (integers, halves, ...)
//! this reproduces `floor(k * skip_factor) mod N` exactly, forever. Otherwise
//! the only error is the rounding of the tuning word: at most `2^-33 / Fs`
//! positions per sample, i.e. one table position after roughly `2^33` seconds.
//! Because the phase is advanced sample by sample, splitting a run into
//! requests of any sizes yields exactly the same samples.

use alloc::vec;
use alloc::vec::Vec;

use crate::dsp::Sample;
use crate::error::ConfigError;

/// Fractional bits of the tuning word.
pub const FRAC_BITS: u32 = 32;

/// Parameters negotiated at construction, reported before any data request.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DdsSettings {
    /// Table traversals per second (Ws).
    pub waveform_rate: f64,
    /// Output samples per second (Fs).
    pub sample_rate: u32,
    /// Table length (N).
    pub n: usize,
    /// Table positions advanced per output sample, `Ws * N / Fs`.
    pub skip_factor: f64,
}

/// Integer phase accumulator over a table of `len` positions.
#[derive(Copy, Clone, Debug)]
pub struct PhaseAccumulator {
    phase: u128,
    step: u128,
    unit: u128,
    modulus: u128,
    emitted: u64,
}

impl PhaseAccumulator {
    pub fn new(len: usize, waveform_rate: f64, sample_rate: u32) -> Result<Self, ConfigError> {
        if len == 0 {
            return Err(ConfigError::EmptyWaveform);
        }
        if sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }
        if !(waveform_rate.is_finite() && waveform_rate > 0.0) {
            return Err(ConfigError::InvalidWaveformRate(waveform_rate));
        }

        let unit = u128::from(sample_rate) << FRAC_BITS;
        let modulus = unit * len as u128;
        let word = waveform_rate * len as f64 * (1u64 << FRAC_BITS) as f64;
        if word >= u128::MAX as f64 {
            return Err(ConfigError::TuningWordOverflow { rate: waveform_rate, len });
        }
        // `as` truncates toward zero; word is positive so this rounds to nearest.
        let step = ((word + 0.5) as u128) % modulus;

        Ok(Self { phase: 0, step, unit, modulus, emitted: 0 })
    }

    /// Table index for the current sample.
    #[inline]
    pub fn index(&self) -> usize {
        (self.phase / self.unit) as usize
    }

    /// Move to the next sample.
    #[inline]
    pub fn advance(&mut self) {
        // step < modulus, so one subtraction restores the range.
        self.phase += self.step;
        if self.phase >= self.modulus {
            self.phase -= self.modulus;
        }
        self.emitted += 1;
    }

    /// Samples produced since construction (the `i` of the closed form).
    #[inline]
    pub fn samples_emitted(&self) -> u64 {
        self.emitted
    }
}

/// Nearest-neighbor DDS resampler over an owned wavetable.
#[derive(Clone, Debug)]
pub struct Dds {
    table: Vec<Sample>,
    acc: PhaseAccumulator,
    settings: DdsSettings,
}

impl Dds {
    /// Build a synthesizer for `waveform` played `waveform_rate` times per
    /// second at `sample_rate` samples per second.
    pub fn new(waveform: Vec<Sample>, waveform_rate: f64, sample_rate: u32) -> Result<Self, ConfigError> {
        let n = waveform.len();
        let acc = PhaseAccumulator::new(n, waveform_rate, sample_rate)?;
        let settings = DdsSettings {
            waveform_rate,
            sample_rate,
            n,
            skip_factor: waveform_rate * n as f64 / f64::from(sample_rate),
        };
        Ok(Self { table: waveform, acc, settings })
    }

    #[inline] pub fn settings(&self) -> &DdsSettings { &self.settings }

    #[inline] pub fn table(&self) -> &[Sample] { &self.table }

    #[inline] pub fn samples_emitted(&self) -> u64 { self.acc.samples_emitted() }

    /// Fill `out` with the next `out.len()` samples. Allocation-free.
    #[inline]
    pub fn fill(&mut self, out: &mut [Sample]) {
        for y in out.iter_mut() {
            let idx = self.acc.index();
            debug_assert!(idx < self.table.len());
            *y = self.table[idx];
            self.acc.advance();
        }
    }

    /// Next `n` samples as a fresh vector. `n == 0` is a no-op.
    pub fn next(&mut self, n: usize) -> Vec<Sample> {
        let mut out = vec![0.0; n];
        self.fill(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ramp(n: usize) -> Vec<Sample> {
        (0..n).map(|i| i as Sample).collect()
    }

    #[test]
    fn settings_reported_before_data() {
        let dds = Dds::new(ramp(1000), 100.0, 100_000).unwrap();
        let s = dds.settings();
        assert_eq!(s.n, 1000);
        assert_eq!(s.sample_rate, 100_000);
        assert_eq!(s.waveform_rate, 100.0);
        assert!((s.skip_factor - 1.0).abs() < 1e-12);
        assert_eq!(dds.samples_emitted(), 0);
    }

    #[test]
    fn rejects_invalid_construction() {
        assert_eq!(Dds::new(vec![], 1.0, 10).unwrap_err(), ConfigError::EmptyWaveform);
        assert_eq!(Dds::new(ramp(4), 1.0, 0).unwrap_err(), ConfigError::InvalidSampleRate(0));
        assert!(matches!(Dds::new(ramp(4), 0.0, 10), Err(ConfigError::InvalidWaveformRate(_))));
        assert!(matches!(Dds::new(ramp(4), -2.0, 10), Err(ConfigError::InvalidWaveformRate(_))));
        assert!(matches!(Dds::new(ramp(4), f64::NAN, 10), Err(ConfigError::InvalidWaveformRate(_))));
        assert!(matches!(Dds::new(ramp(4), 1e300, 10), Err(ConfigError::TuningWordOverflow { .. })));
    }

    #[test]
    fn unit_skip_scenario() {
        // N=5, Ws=2, Fs=10 -> skip factor 1
        let mut dds = Dds::new(ramp(5), 2.0, 10).unwrap();
        assert_eq!(dds.next(5), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(dds.next(5), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(dds.samples_emitted(), 10);
    }

    #[test]
    fn sine_table_single_traversal_in_blocks_of_ten() {
        let n = 1000;
        let table: Vec<Sample> = (0..n)
            .map(|x| (crate::dsp::TAU * x as f64 / n as f64).sin())
            .collect();
        let mut dds = Dds::new(table.clone(), 100.0, 100_000).unwrap();
        let mut out = Vec::with_capacity(n);
        for _ in 0..100 {
            out.extend(dds.next(10));
        }
        assert_eq!(out, table);
    }

    #[test]
    fn zero_request_is_empty_and_does_not_advance() {
        let mut dds = Dds::new(ramp(7), 3.0, 21).unwrap();
        assert!(dds.next(0).is_empty());
        assert_eq!(dds.samples_emitted(), 0);
        assert_eq!(dds.next(1), vec![0.0]);
    }

    #[test]
    fn fractional_skip_matches_closed_form() {
        // Ws=1, N=10, Fs=100 -> skip factor 0.1: every table entry held 10 samples.
        let mut dds = Dds::new(ramp(10), 1.0, 100).unwrap();
        let out = dds.next(200);
        for (k, &y) in out.iter().enumerate() {
            assert_eq!(y, ((k / 10) % 10) as Sample, "k={}", k);
        }
    }

    #[test]
    fn skip_above_table_length_wraps() {
        // skip factor 2.5 on a 4-sample table
        let mut dds = Dds::new(ramp(4), 25.0, 40).unwrap();
        let out = dds.next(8);
        let expected: Vec<Sample> = (0..8u64).map(|k| ((k * 5 / 2) % 4) as Sample).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn long_run_has_no_phase_drift() {
        // With skip factor 1 the index must still equal i mod N after 2^20 samples.
        let mut acc = PhaseAccumulator::new(1000, 100.0, 100_000).unwrap();
        let jump: u64 = 1 << 20;
        for _ in 0..jump {
            acc.advance();
        }
        assert_eq!(acc.index(), (jump % 1000) as usize);
    }

    proptest! {
        #[test]
        fn partition_does_not_change_output(
            len in 1usize..64,
            ws in 0.01f64..500.0,
            fs in 1u32..50_000,
            sizes in proptest::collection::vec(0usize..40, 0..12),
        ) {
            let total: usize = sizes.iter().sum();
            let mut whole = Dds::new(ramp(len), ws, fs).unwrap();
            let mut parts = whole.clone();
            let expected = whole.next(total);
            let mut got = Vec::with_capacity(total);
            for n in sizes {
                got.extend(parts.next(n));
            }
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn indices_stay_in_table(
            len in 1usize..5000,
            ws in 0.001f64..1.0e5,
            fs in 1u32..200_000,
            steps in 0usize..2000,
        ) {
            let mut acc = PhaseAccumulator::new(len, ws, fs).unwrap();
            for _ in 0..steps {
                prop_assert!(acc.index() < len);
                acc.advance();
            }
            prop_assert!(acc.index() < len);
        }

        #[test]
        fn unit_skip_is_cyclic_for_any_partition(
            len in 1usize..200,
            sizes in proptest::collection::vec(0usize..50, 1..20),
        ) {
            // Ws = Fs / N gives skip factor 1.
            let fs = (len * 10) as u32;
            let mut dds = Dds::new(ramp(len), 10.0, fs).unwrap();
            let mut got = Vec::new();
            for n in sizes {
                got.extend(dds.next(n));
            }
            for (k, &y) in got.iter().enumerate() {
                prop_assert_eq!(y, (k % len) as Sample);
            }
        }
    }
}

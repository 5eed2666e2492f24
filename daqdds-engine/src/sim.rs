//! Simulated DAQ devices.
//!
//! `SimInput` generates deterministic signals and, when paced, releases each
//! block only once the wall clock says the device would have captured it, so
//! it behaves as a master clock. `SimOutput` accepts blocks and drops them.
//! Both can be told to fail after a number of blocks, and both report to an
//! optional [`SimProbe`] that tests use to observe ordering and device lifetime.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use daqdds_core::block::SampleBlock;
use daqdds_core::dsp::{Sample, TAU};
use daqdds_core::error::ConfigError;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{
    buffer_capacity, check_block_size, check_channels, AcquisitionSource, OutputSink, DEVICE_BUFFER_SECONDS,
};
use crate::error::{ConfigurationError, DeviceError};
use crate::settings::{ChannelKind, ChannelSpec, Settings};

/// What a simulated device did, in order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SimEvent {
    Acquired { seq: u64, frames: usize },
    Written { seq: u64, channels: usize, frames: usize },
}

#[derive(Debug, Default)]
struct ProbeInner {
    events: Mutex<Vec<SimEvent>>,
    written: Mutex<Vec<SampleBlock>>,
    input_open: AtomicBool,
    output_open: AtomicBool,
}

/// Shared observer for simulated devices. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct SimProbe {
    inner: Arc<ProbeInner>,
}

impl SimProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event log so far.
    pub fn events(&self) -> Vec<SimEvent> {
        self.inner.events.lock().clone()
    }

    /// Blocks received by the output, in write order.
    pub fn written_blocks(&self) -> Vec<SampleBlock> {
        self.inner.written.lock().clone()
    }

    pub fn input_open(&self) -> bool {
        self.inner.input_open.load(Ordering::Acquire)
    }

    pub fn output_open(&self) -> bool {
        self.inner.output_open.load(Ordering::Acquire)
    }

    fn push(&self, event: SimEvent) {
        self.inner.events.lock().push(event);
    }
}

/// Signal generated by [`SimInput`].
///
/// In JSON: `{ "kind": "sine", "hz": 13.0, "amplitude": 2.0 }`. On the
/// command line: `ramp`, `sine[:hz[:amplitude]]` or `noise[:amplitude]`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SimSignal {
    /// Running sample index on every channel: 0, 1, 2, ...
    #[default]
    Ramp,
    /// Sine at `hz`; channel `c` leads by `c / channels` of a period.
    Sine { hz: f64, amplitude: f64 },
    /// Uniform noise in `[-amplitude, amplitude]` from a fixed seed.
    Noise { amplitude: f64 },
}

impl SimSignal {
    /// Reject parameters the generator cannot produce.
    pub fn validate(self) -> Result<Self, ConfigurationError> {
        let invalid = |reason| ConfigurationError::InvalidSignal { signal: format!("{self:?}"), reason };
        match self {
            SimSignal::Ramp => {}
            SimSignal::Sine { hz, amplitude } => {
                if !hz.is_finite() {
                    return Err(invalid("frequency must be finite"));
                }
                if !(amplitude.is_finite() && amplitude >= 0.0) {
                    return Err(invalid("amplitude must be finite and non-negative"));
                }
            }
            SimSignal::Noise { amplitude } => {
                if !(amplitude.is_finite() && amplitude >= 0.0) {
                    return Err(invalid("amplitude must be finite and non-negative"));
                }
            }
        }
        Ok(self)
    }
}

impl FromStr for SimSignal {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConfigurationError::InvalidSignal { signal: s.to_string(), reason };
        let mut parts = s.trim().split(':');
        let kind = parts.next().unwrap_or_default().to_ascii_lowercase();
        let mut param = |default: f64| -> Result<f64, ConfigurationError> {
            match parts.next() {
                None => Ok(default),
                Some(p) => p.trim().parse().map_err(|_| invalid("parameter is not a number")),
            }
        };
        let signal = match kind.as_str() {
            "ramp" => SimSignal::Ramp,
            "sine" => SimSignal::Sine { hz: param(1.0)?, amplitude: param(1.0)? },
            "noise" => SimSignal::Noise { amplitude: param(1.0)? },
            _ => return Err(invalid("expected ramp, sine or noise")),
        };
        if parts.next().is_some() {
            return Err(invalid("too many parameters"));
        }
        signal.validate()
    }
}

/// Simulated analog input.
pub struct SimInput {
    settings: Settings,
    signal: SimSignal,
    rng: SmallRng,
    next_frame: u64,
    blocks: u64,
    paced: bool,
    started: Option<Instant>,
    overrun_after: Option<u64>,
    probe: Option<SimProbe>,
}

impl SimInput {
    /// Open `physical_channels` (an `ai` specifier) at `sample_rate`, delivering
    /// `block_size` samples per channel per acquire.
    pub fn open(physical_channels: &str, sample_rate: u32, block_size: usize) -> Result<Self, ConfigurationError> {
        let spec = ChannelSpec::parse_kind(physical_channels, ChannelKind::AnalogInput)?;
        if sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(sample_rate).into());
        }
        check_block_size(block_size, sample_rate)?;
        let settings = Settings::input(&spec, spec.count(), sample_rate, block_size);
        debug!(channels = %settings.physical_channels, sample_rate, block_size, "sim input opened");

        Ok(Self {
            settings,
            signal: SimSignal::Ramp,
            rng: SmallRng::seed_from_u64(0x0dd5_eed5),
            next_frame: 0,
            blocks: 0,
            paced: false,
            started: None,
            overrun_after: None,
            probe: None,
        })
    }

    pub fn with_signal(mut self, signal: SimSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Release blocks at the device's sample clock instead of immediately.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Report an overrun on the acquire after `blocks` successful ones.
    pub fn with_overrun_after(mut self, blocks: u64) -> Self {
        self.overrun_after = Some(blocks);
        self
    }

    pub fn with_probe(mut self, probe: &SimProbe) -> Self {
        probe.inner.input_open.store(true, Ordering::Release);
        self.probe = Some(probe.clone());
        self
    }

    fn block_size(&self) -> usize {
        self.settings.sample_block_size.unwrap_or(1)
    }

    fn overrun(&self) -> DeviceError {
        DeviceError::Overrun { device: self.settings.physical_channels.clone() }
    }

    /// Sleep until block `self.blocks` is due. Being later than the device
    /// buffer can absorb is an overrun.
    fn wait_for_clock(&mut self) -> Result<(), DeviceError> {
        let start = *self.started.get_or_insert_with(Instant::now);
        let frames_due = (self.blocks + 1) * self.block_size() as u64;
        let due = start + Duration::from_secs_f64(frames_due as f64 / f64::from(self.settings.sample_rate));
        let now = Instant::now();
        if now < due {
            thread::sleep(due - now);
        } else if now - due > Duration::from_secs(u64::from(DEVICE_BUFFER_SECONDS)) {
            return Err(self.overrun());
        }
        Ok(())
    }

    fn sample(&mut self, channel: usize, frame: u64) -> Sample {
        match self.signal {
            SimSignal::Ramp => frame as Sample,
            SimSignal::Sine { hz, amplitude } => {
                let t = frame as f64 / f64::from(self.settings.sample_rate);
                let lead = channel as f64 / self.settings.number_of_channels as f64;
                amplitude * (TAU * (hz * t + lead)).sin()
            }
            SimSignal::Noise { amplitude } if amplitude > 0.0 => self.rng.gen_range(-amplitude..=amplitude),
            SimSignal::Noise { .. } => 0.0,
        }
    }
}

impl AcquisitionSource for SimInput {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn acquire(&mut self) -> Result<SampleBlock, DeviceError> {
        if self.overrun_after.is_some_and(|n| self.blocks >= n) {
            return Err(self.overrun());
        }
        if self.paced {
            self.wait_for_clock()?;
        } else if self.started.is_none() {
            self.started = Some(Instant::now());
        }

        let frames = self.block_size();
        let channels = self.settings.number_of_channels;
        let mut block = SampleBlock::zeros(channels, frames);
        for ch in 0..channels {
            for i in 0..frames {
                let v = self.sample(ch, self.next_frame + i as u64);
                block.channel_mut(ch)[i] = v;
            }
        }
        self.next_frame += frames as u64;

        if let Some(probe) = &self.probe {
            probe.push(SimEvent::Acquired { seq: self.blocks, frames });
        }
        self.blocks += 1;
        Ok(block)
    }
}

impl Drop for SimInput {
    fn drop(&mut self) {
        if let Some(probe) = &self.probe {
            probe.inner.input_open.store(false, Ordering::Release);
        }
        debug!(channels = %self.settings.physical_channels, blocks = self.blocks, "sim input closed");
    }
}

/// Simulated analog output.
pub struct SimOutput {
    settings: Settings,
    capacity: usize,
    writes: u64,
    underrun_after: Option<u64>,
    probe: Option<SimProbe>,
}

impl SimOutput {
    /// Open `physical_channels` (an `ao` specifier) at `sample_rate`.
    pub fn open(physical_channels: &str, sample_rate: u32) -> Result<Self, ConfigurationError> {
        let spec = ChannelSpec::parse_kind(physical_channels, ChannelKind::AnalogOutput)?;
        if sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(sample_rate).into());
        }
        let settings = Settings::output(&spec, spec.count(), sample_rate);
        debug!(channels = %settings.physical_channels, sample_rate, "sim output opened");

        Ok(Self {
            settings,
            capacity: buffer_capacity(sample_rate),
            writes: 0,
            underrun_after: None,
            probe: None,
        })
    }

    /// Report an underrun on the write after `blocks` successful ones.
    pub fn with_underrun_after(mut self, blocks: u64) -> Self {
        self.underrun_after = Some(blocks);
        self
    }

    pub fn with_probe(mut self, probe: &SimProbe) -> Self {
        probe.inner.output_open.store(true, Ordering::Release);
        self.probe = Some(probe.clone());
        self
    }
}

impl OutputSink for SimOutput {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn write(&mut self, block: SampleBlock) -> Result<(), DeviceError> {
        check_channels(&self.settings, &block)?;
        if block.frames() > self.capacity {
            return Err(DeviceError::BufferFull {
                device: self.settings.physical_channels.clone(),
                pending: block.frames() * block.channels(),
            });
        }
        if self.underrun_after.is_some_and(|n| self.writes >= n) {
            return Err(DeviceError::Underrun { device: self.settings.physical_channels.clone() });
        }
        if self.writes == 0 {
            debug!(channels = %self.settings.physical_channels, "sim output started");
        }

        if let Some(probe) = &self.probe {
            probe.push(SimEvent::Written { seq: self.writes, channels: block.channels(), frames: block.frames() });
            probe.inner.written.lock().push(block);
        }
        self.writes += 1;
        Ok(())
    }
}

impl Drop for SimOutput {
    fn drop(&mut self) {
        if let Some(probe) = &self.probe {
            probe.inner.output_open.store(false, Ordering::Release);
        }
        debug!(channels = %self.settings.physical_channels, writes = self.writes, "sim output closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_settings_resolve_channel_count() {
        let input = SimInput::open("Dev2/ai0:15", 10_000, 10).unwrap();
        let s = input.settings();
        assert_eq!(s.number_of_channels, 16);
        assert_eq!(s.sample_rate, 10_000);
        assert_eq!(s.sample_block_size, Some(10));
    }

    #[test]
    fn open_rejects_bad_configuration() {
        assert!(matches!(SimInput::open("Dev2/ao0:3", 1000, 10), Err(ConfigurationError::ChannelKind { .. })));
        assert!(matches!(SimInput::open("Dev2/ai0:3", 1000, 0), Err(ConfigurationError::ZeroBlockSize)));
        assert!(matches!(SimInput::open("Dev2/ai0:3", 0, 10), Err(ConfigurationError::Core(_))));
        assert!(matches!(
            SimInput::open("Dev2/ai0:3", 1000, 5001),
            Err(ConfigurationError::BlockTooLarge { block_size: 5001, capacity: 5000 })
        ));
        assert!(SimInput::open("Dev2/ai0:3", 1000, 5000).is_ok());
        assert!(matches!(SimOutput::open("nonsense", 1000), Err(ConfigurationError::ChannelSpec { .. })));
    }

    #[test]
    fn ramp_is_continuous_across_blocks() {
        let mut input = SimInput::open("Dev1/ai0:1", 1000, 4).unwrap();
        let a = input.acquire().unwrap();
        let b = input.acquire().unwrap();
        assert_eq!(a.channel(0), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(b.channel(1), &[4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn noise_stays_within_amplitude() {
        let mut input = SimInput::open("Dev1/ai0:3", 1000, 64)
            .unwrap()
            .with_signal(SimSignal::Noise { amplitude: 0.01 });
        let block = input.acquire().unwrap();
        assert!(block.as_slice().iter().all(|v| v.abs() <= 0.01));
    }

    #[test]
    fn signals_parse_from_text() {
        assert_eq!("ramp".parse::<SimSignal>().unwrap(), SimSignal::Ramp);
        assert_eq!("sine".parse::<SimSignal>().unwrap(), SimSignal::Sine { hz: 1.0, amplitude: 1.0 });
        assert_eq!("Sine:13:0.5".parse::<SimSignal>().unwrap(), SimSignal::Sine { hz: 13.0, amplitude: 0.5 });
        assert_eq!("noise:0.01".parse::<SimSignal>().unwrap(), SimSignal::Noise { amplitude: 0.01 });

        for bad in ["square", "sine:x", "noise:-1", "noise:1:2", "sine:inf"] {
            assert!(
                matches!(bad.parse::<SimSignal>(), Err(ConfigurationError::InvalidSignal { .. })),
                "{bad} was accepted"
            );
        }
    }

    #[test]
    fn signals_read_from_json() {
        let s: SimSignal = serde_json::from_str(r#"{ "kind": "noise", "amplitude": 0.25 }"#).unwrap();
        assert_eq!(s, SimSignal::Noise { amplitude: 0.25 });
        let s: SimSignal = serde_json::from_str(r#"{ "kind": "ramp" }"#).unwrap();
        assert_eq!(s, SimSignal::Ramp);
        assert!(serde_json::from_str::<SimSignal>(r#"{ "kind": "sine", "hz": 1.0 }"#).is_err());
    }

    #[test]
    fn silent_noise_is_zero() {
        let mut input = SimInput::open("Dev1/ai0", 1000, 8).unwrap().with_signal(SimSignal::Noise { amplitude: 0.0 });
        assert!(input.acquire().unwrap().as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn paced_input_follows_sample_clock() {
        // 50 samples at 1 kHz: five blocks take at least 50 ms.
        let mut input = SimInput::open("Dev1/ai0", 1000, 10).unwrap().paced(true);
        let start = Instant::now();
        for _ in 0..5 {
            input.acquire().unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(45), "{:?}", start.elapsed());
    }

    #[test]
    fn injected_faults_surface() {
        let mut input = SimInput::open("Dev1/ai0", 1000, 10).unwrap().with_overrun_after(1);
        assert!(input.acquire().is_ok());
        assert!(matches!(input.acquire(), Err(DeviceError::Overrun { .. })));

        let mut output = SimOutput::open("Dev1/ao0:1", 1000).unwrap().with_underrun_after(0);
        assert!(matches!(output.write(SampleBlock::zeros(2, 10)), Err(DeviceError::Underrun { .. })));
    }

    #[test]
    fn output_checks_shape() {
        let mut output = SimOutput::open("Dev3/ao0:7", 1000).unwrap();
        assert!(matches!(
            output.write(SampleBlock::zeros(4, 10)),
            Err(DeviceError::ChannelMismatch { expected: 8, actual: 4, .. })
        ));
        assert!(matches!(output.write(SampleBlock::zeros(8, 5001)), Err(DeviceError::BufferFull { .. })));
        assert!(output.write(SampleBlock::zeros(8, 3)).is_ok());
    }

    #[test]
    fn probe_tracks_lifetime_and_events() {
        let probe = SimProbe::new();
        let mut input = SimInput::open("Dev1/ai0:1", 1000, 4).unwrap().with_probe(&probe);
        let mut output = SimOutput::open("Dev1/ao0:1", 1000).unwrap().with_probe(&probe);
        assert!(probe.input_open() && probe.output_open());

        let block = input.acquire().unwrap();
        output.write(block).unwrap();
        assert_eq!(
            probe.events(),
            vec![
                SimEvent::Acquired { seq: 0, frames: 4 },
                SimEvent::Written { seq: 0, channels: 2, frames: 4 },
            ]
        );

        drop(input);
        drop(output);
        assert!(!probe.input_open() && !probe.output_open());
    }
}

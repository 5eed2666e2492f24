//! Pipeline configuration: a JSON file, CLI overrides, and the one place
//! that turns a configuration into open devices.
//!
//! Defaults mirror the reference rig: 16 inputs on `Dev2`, 8 outputs on
//! `Dev3`, 10 kHz, blocks of 10 samples, 1000-point sine at 100 Hz when a
//! synthesizer is requested.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use daqdds_core::dds::Dds;
use daqdds_core::dsp::Sample;
use daqdds_core::wavetable::Wave;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coordinator::StreamCoordinator;
use crate::device::{AcquisitionSource, OutputSink};
use crate::error::ConfigurationError;
use crate::sim::{SimInput, SimOutput, SimSignal};

pub type BoxedSource = Box<dyn AcquisitionSource>;
pub type BoxedSink = Box<dyn OutputSink>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Simulated devices.
    #[default]
    Sim,
    /// Host audio devices through cpal (`realtime` feature).
    Cpal,
}

impl FromStr for Backend {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sim" => Ok(Backend::Sim),
            "cpal" => Ok(Backend::Cpal),
            _ => Err(ConfigurationError::Unsupported { spec: s.to_string(), reason: "unknown backend".into() }),
        }
    }
}

/// Synthesizer parameters. The table is generated from `waveform`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DdsConfig {
    pub waveform: String,
    /// Table length N.
    pub points: usize,
    /// Table traversals per second Ws.
    pub waveform_rate: f64,
    pub amplitude: f64,
}

impl Default for DdsConfig {
    fn default() -> Self {
        Self { waveform: "sine".into(), points: 1000, waveform_rate: 100.0, amplitude: 1.0 }
    }
}

impl DdsConfig {
    /// Generate the table and build a synthesizer running at `sample_rate`.
    pub fn build(&self, sample_rate: u32) -> Result<Dds, ConfigurationError> {
        let wave = Wave::from_str(&self.waveform)
            .map_err(|_| ConfigurationError::UnknownWaveform(self.waveform.clone()))?;
        let table = wave.table::<Sample>(self.points, self.amplitude);
        Ok(Dds::new(table, self.waveform_rate, sample_rate)?)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub ai_channels: String,
    pub ao_channels: String,
    pub sample_rate: u32,
    pub block_size: usize,
    pub backend: Backend,
    /// Simulated input only: release blocks at the sample clock.
    pub paced: bool,
    /// Simulated input only: what the channels carry.
    pub signal: SimSignal,
    /// Stop after this many iterations; `None` runs until stopped.
    pub iterations: Option<u64>,
    /// Output a synthesized waveform instead of passing the input through.
    pub dds: Option<DdsConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ai_channels: "Dev2/ai0:15".into(),
            ao_channels: "Dev3/ao0:7".into(),
            sample_rate: 10_000,
            block_size: 10,
            backend: Backend::Sim,
            paced: true,
            signal: SimSignal::Ramp,
            iterations: None,
            dds: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigurationError::ConfigFile { path: path.to_path_buf(), source })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigurationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Open both devices and, if configured, the synthesizer. The output is
    /// opened at the rate the input actually negotiated, the synthesizer at
    /// the output's rate.
    pub fn open(&self) -> Result<StreamCoordinator<BoxedSource, BoxedSink>, ConfigurationError> {
        let (input, output) = self.open_devices()?;
        info!(backend = ?self.backend, ai = %self.ai_channels, ao = %self.ao_channels, "devices opened");
        let synth = match &self.dds {
            Some(dds) => Some(dds.build(output.settings().sample_rate)?),
            None => None,
        };
        let coordinator = StreamCoordinator::new(input, output);
        Ok(match synth {
            Some(dds) => coordinator.with_synthesizer(dds),
            None => coordinator,
        })
    }

    fn open_devices(&self) -> Result<(BoxedSource, BoxedSink), ConfigurationError> {
        match self.backend {
            Backend::Sim => {
                let input = SimInput::open(&self.ai_channels, self.sample_rate, self.block_size)?
                    .paced(self.paced)
                    .with_signal(self.signal.validate()?);
                let rate = input.settings().sample_rate;
                let output = SimOutput::open(&self.ao_channels, rate)?;
                Ok((Box::new(input), Box::new(output)))
            }
            #[cfg(feature = "realtime")]
            Backend::Cpal => {
                use crate::cpal_io::{CpalInput, CpalOutput};
                let input = CpalInput::open(&self.ai_channels, self.sample_rate, self.block_size)?;
                let rate = input.settings().sample_rate;
                let output = CpalOutput::open(&self.ao_channels, rate)?;
                Ok((Box::new(input), Box::new(output)))
            }
            #[cfg(not(feature = "realtime"))]
            Backend::Cpal => Err(ConfigurationError::Unsupported {
                spec: self.ai_channels.clone(),
                reason: "built without the `realtime` feature".into(),
            }),
        }
    }
}

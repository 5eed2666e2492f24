//! Channel specifiers and the immutable per-stream `Settings` snapshots.
//!
//! A channel specifier names a device and a contiguous channel range:
//! `Dev2/ai0:15` is analog inputs 0..=15 of device 2, `Dev3/ao0:7` analog
//! outputs 0..=7 of device 3, `Dev1/ai4` a single input channel.

use std::fmt;
use std::str::FromStr;

use daqdds_core::dds::DdsSettings;

use crate::error::ConfigurationError;

/// Analog input or analog output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    AnalogInput,
    AnalogOutput,
}

impl ChannelKind {
    /// Prefix used in channel specifiers.
    pub fn prefix(self) -> &'static str {
        match self {
            ChannelKind::AnalogInput => "ai",
            ChannelKind::AnalogOutput => "ao",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ChannelKind::AnalogInput => "analog input",
            ChannelKind::AnalogOutput => "analog output",
        }
    }
}

/// Parsed `Dev<device>/<ai|ao><first>[:<last>]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelSpec {
    pub device: u32,
    pub kind: ChannelKind,
    pub first: u32,
    pub last: u32,
}

impl ChannelSpec {
    /// Parse and require the given channel kind.
    pub fn parse_kind(s: &str, kind: ChannelKind) -> Result<Self, ConfigurationError> {
        let spec: ChannelSpec = s.parse()?;
        if spec.kind != kind {
            return Err(ConfigurationError::ChannelKind { spec: s.to_string(), expected: kind.describe() });
        }
        Ok(spec)
    }

    /// Number of channels in the range.
    pub fn count(&self) -> usize {
        (self.last - self.first) as usize + 1
    }
}

impl FromStr for ChannelSpec {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |reason| ConfigurationError::ChannelSpec { spec: s.to_string(), reason };

        let (dev, chans) = s.trim().split_once('/').ok_or_else(|| bad("expected Dev<n>/<ai|ao><range>"))?;
        let dev_num = dev
            .get(..3)
            .filter(|p| p.eq_ignore_ascii_case("dev"))
            .map(|_| &dev[3..])
            .ok_or_else(|| bad("device must be written Dev<n>"))?;
        let device = dev_num.parse::<u32>().map_err(|_| bad("device number is not an integer"))?;

        let kind = match chans.get(..2) {
            Some(p) if p.eq_ignore_ascii_case("ai") => ChannelKind::AnalogInput,
            Some(p) if p.eq_ignore_ascii_case("ao") => ChannelKind::AnalogOutput,
            _ => return Err(bad("channel type must be ai or ao")),
        };
        let range = &chans[2..];
        let (first, last) = match range.split_once(':') {
            Some((a, b)) => (a, b),
            None => (range, range),
        };
        let first = first.parse::<u32>().map_err(|_| bad("channel range start is not an integer"))?;
        let last = last.parse::<u32>().map_err(|_| bad("channel range end is not an integer"))?;
        if last < first {
            return Err(bad("channel range end is below its start"));
        }

        Ok(Self { device, kind, first, last })
    }
}

impl fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dev{}/{}{}", self.device, self.kind.prefix(), self.first)?;
        if self.last != self.first {
            write!(f, ":{}", self.last)?;
        }
        Ok(())
    }
}

/// Immutable snapshot of one stream's negotiated parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub physical_channels: String,
    pub number_of_channels: usize,
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Samples per channel per acquired block; input streams only.
    pub sample_block_size: Option<usize>,
}

impl Settings {
    pub fn input(spec: &ChannelSpec, number_of_channels: usize, sample_rate: u32, block_size: usize) -> Self {
        Self {
            physical_channels: spec.to_string(),
            number_of_channels,
            sample_rate,
            sample_block_size: Some(block_size),
        }
    }

    pub fn output(spec: &ChannelSpec, number_of_channels: usize, sample_rate: u32) -> Self {
        Self {
            physical_channels: spec.to_string(),
            number_of_channels,
            sample_rate,
            sample_block_size: None,
        }
    }

    fn write_fields(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        writeln!(f, "{indent}physical_channels: {}", self.physical_channels)?;
        writeln!(f, "{indent}number_of_channels: {}", self.number_of_channels)?;
        writeln!(f, "{indent}sample_rate: {}", self.sample_rate)?;
        if let Some(block) = self.sample_block_size {
            writeln!(f, "{indent}sample_block_size: {block}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_fields(f, "")
    }
}

/// Everything negotiated for one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    pub ai: Settings,
    pub ao: Settings,
    pub dds: Option<DdsSettings>,
}

impl fmt::Display for PipelineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ai:")?;
        self.ai.write_fields(f, "  ")?;
        writeln!(f, "ao:")?;
        self.ao.write_fields(f, "  ")?;
        if let Some(dds) = &self.dds {
            writeln!(f, "dds:")?;
            writeln!(f, "  waveform_rate: {}", dds.waveform_rate)?;
            writeln!(f, "  sample_rate: {}", dds.sample_rate)?;
            writeln!(f, "  N: {}", dds.n)?;
            writeln!(f, "  skip_factor: {}", dds.skip_factor)?;
        }
        Ok(())
    }
}

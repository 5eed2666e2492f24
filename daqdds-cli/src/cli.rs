use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use daqdds_engine::sim::SimSignal;
use daqdds_engine::{Backend, ConfigurationError, DdsConfig, PipelineConfig};

#[derive(Debug, Parser)]
#[command(name = "daqdds", version)]
#[command(about = "Block-synchronized analog acquisition with DDS waveform output")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream in this process: pass-through, or DDS output with --waveform.
    Run(PipelineArgs),
    /// Stream on a worker thread behind an interactive prompt.
    Supervise(PipelineArgs),
    /// List host audio devices usable with --backend cpal.
    Devices,
}

#[derive(Debug, Clone, Default, Args)]
pub struct PipelineArgs {
    /// JSON config file; flags override its fields.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Input channels, e.g. Dev2/ai0:15.
    #[arg(long)]
    pub ai: Option<String>,

    /// Output channels, e.g. Dev3/ao0:7.
    #[arg(long)]
    pub ao: Option<String>,

    /// Samples per second per channel.
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Samples per channel per acquired block.
    #[arg(long)]
    pub block_size: Option<usize>,

    /// sim | cpal
    #[arg(long)]
    pub backend: Option<Backend>,

    /// Stop after this many iterations (run only).
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Synthesize sine | tri | saw on every output channel.
    #[arg(long)]
    pub waveform: Option<String>,

    /// Waveform table length N.
    #[arg(long)]
    pub points: Option<usize>,

    /// Table traversals per second Ws.
    #[arg(long)]
    pub waveform_rate: Option<f64>,

    /// Peak value of the synthesized waveform.
    #[arg(long)]
    pub amplitude: Option<f64>,

    /// Simulated input delivers blocks as fast as they are requested.
    #[arg(long)]
    pub unpaced: bool,

    /// Simulated input signal: ramp, sine[:hz[:amplitude]] or noise[:amplitude].
    #[arg(long)]
    pub signal: Option<SimSignal>,
}

impl PipelineArgs {
    /// Config file (or defaults) with the given flags applied on top.
    pub fn resolve(&self) -> Result<PipelineConfig, ConfigurationError> {
        let mut c = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(v) = &self.ai { c.ai_channels = v.clone(); }
        if let Some(v) = &self.ao { c.ao_channels = v.clone(); }
        if let Some(v) = self.sample_rate { c.sample_rate = v; }
        if let Some(v) = self.block_size { c.block_size = v; }
        if let Some(v) = self.backend { c.backend = v; }
        if let Some(v) = self.iterations { c.iterations = Some(v); }
        if self.unpaced { c.paced = false; }
        if let Some(v) = self.signal { c.signal = v; }

        let wants_dds = self.waveform.is_some()
            || self.points.is_some()
            || self.waveform_rate.is_some()
            || self.amplitude.is_some();
        if wants_dds {
            let dds = c.dds.get_or_insert_with(DdsConfig::default);
            if let Some(v) = &self.waveform { dds.waveform = v.clone(); }
            if let Some(v) = self.points { dds.points = v; }
            if let Some(v) = self.waveform_rate { dds.waveform_rate = v; }
            if let Some(v) = self.amplitude { dds.amplitude = v; }
        }
        Ok(c)
    }
}

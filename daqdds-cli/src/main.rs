//! daqdds CLI: run the acquisition → DDS → output pipeline from a terminal.
//!
//! Logs go to stderr (filter with `RUST_LOG`, default `info`); the prompt and
//! settings dumps go to stdout.

mod cli;

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use daqdds_engine::{supervise, PipelineConfig, StreamCoordinator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, PipelineArgs};

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(&args),
        Command::Supervise(args) => run_supervised(&args),
        Command::Devices => list_devices(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .try_init();
}

fn resolve(args: &PipelineArgs) -> Result<PipelineConfig> {
    let config = args.resolve().context("resolving configuration")?;
    info!(backend = ?config.backend, ai = %config.ai_channels, ao = %config.ao_channels, "configuration resolved");
    Ok(config)
}

fn run(args: &PipelineArgs) -> Result<()> {
    let config = resolve(args)?;
    let mut coordinator: StreamCoordinator<_, _> = config.open().context("opening devices")?;
    let settings = coordinator.negotiate().context("negotiating settings")?;

    let mut out = io::stdout().lock();
    writeln!(out, "settings =")?;
    write!(out, "{settings}")?;
    out.flush()?;

    let limit = config.iterations;
    if limit.is_none() {
        info!("no --iterations given, streaming until interrupted");
    }
    let n = coordinator
        .run(|n| limit.map_or(true, |max| n < max))
        .context("streaming")?;
    writeln!(out, "iterations: {n}")?;
    Ok(())
}

fn run_supervised(args: &PipelineArgs) -> Result<()> {
    let config = resolve(args)?;
    if config.iterations.is_some() {
        warn!("--iterations is ignored under supervision; stop from the prompt");
    }
    let stdin = io::stdin();
    let report = supervise(move || Ok(config.open()?), stdin.lock(), io::stdout()).context("supervised run")?;

    let mut out = io::stdout().lock();
    write!(out, "{report}")?;
    Ok(())
}

fn list_devices() -> Result<()> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "realtime")] {
            let devices = daqdds_engine::cpal_io::list_devices().context("enumerating devices")?;
            let mut out = io::stdout().lock();
            if devices.is_empty() {
                writeln!(out, "no devices")?;
            }
            for d in devices {
                writeln!(out, "{d}")?;
            }
            Ok(())
        } else {
            anyhow::bail!("built without the `realtime` feature; only the simulated backend is available")
        }
    }
}

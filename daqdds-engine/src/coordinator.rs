//! The real-time loop: acquire → (synthesize) → write, paced by the input.
//!
//! `StreamCoordinator` is an explicit state machine:
//!
//! ```text
//! Uninitialized --negotiate--> Negotiated --step--> Running --stop/error--> Stopped
//! ```
//!
//! Each iteration acquires one block (the only blocking call, and so the only
//! clock), asks the synthesizer for exactly as many samples as the block is
//! wide when one is configured, and queues the result on the output. A stop
//! request is only looked at between iterations. Any device error stops the
//! pipeline and releases both devices; nothing is retried.

use std::time::{Duration, Instant};

use daqdds_core::block::SampleBlock;
use daqdds_core::dds::Dds;
use daqdds_core::dsp::{peak_abs, Sample};
use tracing::{debug, info, warn};

use crate::device::{AcquisitionSource, OutputSink};
use crate::error::{ConfigurationError, StreamError, StreamResult};
use crate::settings::PipelineSettings;

/// Iterations between progress reports.
pub const REPORT_INTERVAL: u64 = 100;

/// Lifecycle of a coordinator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamState {
    Uninitialized,
    Negotiated,
    Running,
    Stopped,
}

/// Binds one acquisition source, an optional synthesizer and one output sink.
pub struct StreamCoordinator<I: AcquisitionSource, O: OutputSink> {
    input: Option<I>,
    output: Option<O>,
    synth: Option<Dds>,
    scratch: Vec<Sample>,
    state: StreamState,
    settings: Option<PipelineSettings>,
    iterations: u64,
    pace: PaceMonitor,
}

impl<I: AcquisitionSource, O: OutputSink> StreamCoordinator<I, O> {
    /// Pass-through pipeline: the first `ao` channels of each input block are
    /// written to the output.
    pub fn new(input: I, output: O) -> Self {
        Self {
            input: Some(input),
            output: Some(output),
            synth: None,
            scratch: Vec::new(),
            state: StreamState::Uninitialized,
            settings: None,
            iterations: 0,
            pace: PaceMonitor::default(),
        }
    }

    /// Output the synthesizer's waveform on every output channel instead of
    /// forwarding the input.
    pub fn with_synthesizer(mut self, dds: Dds) -> Self {
        self.synth = Some(dds);
        self
    }

    #[inline] pub fn state(&self) -> StreamState { self.state }

    /// Completed iterations.
    #[inline] pub fn iterations(&self) -> u64 { self.iterations }

    /// Negotiated settings, available from `Negotiated` on.
    #[inline] pub fn settings(&self) -> Option<&PipelineSettings> { self.settings.as_ref() }

    /// Exchange settings and check that the stages agree. Fails before any
    /// data is moved.
    pub fn negotiate(&mut self) -> StreamResult<&PipelineSettings> {
        if self.state != StreamState::Uninitialized {
            return Err(StreamError::InvalidState { state: self.state, action: "negotiate" });
        }
        let (Some(input), Some(output)) = (&self.input, &self.output) else {
            return Err(StreamError::InvalidState { state: self.state, action: "negotiate" });
        };
        let ai = input.settings().clone();
        let ao = output.settings().clone();
        let dds = self.synth.as_ref().map(|d| *d.settings());

        if ao.sample_rate != ai.sample_rate {
            return Err(ConfigurationError::RateMismatch {
                stage: "output",
                expected: ai.sample_rate,
                actual: ao.sample_rate,
            }
            .into());
        }
        match &dds {
            Some(d) if d.sample_rate != ao.sample_rate => {
                return Err(ConfigurationError::RateMismatch {
                    stage: "synthesizer",
                    expected: ao.sample_rate,
                    actual: d.sample_rate,
                }
                .into());
            }
            None if ai.number_of_channels < ao.number_of_channels => {
                return Err(ConfigurationError::ChannelShortfall {
                    needed: ao.number_of_channels,
                    available: ai.number_of_channels,
                }
                .into());
            }
            _ => {}
        }

        info!(
            ai = %ai.physical_channels,
            ao = %ao.physical_channels,
            sample_rate = ai.sample_rate,
            block_size = ai.sample_block_size,
            dds = dds.is_some(),
            "pipeline negotiated"
        );
        self.state = StreamState::Negotiated;
        Ok(self.settings.insert(PipelineSettings { ai, ao, dds }))
    }

    /// One iteration: acquire, synthesize if configured, write.
    pub fn step(&mut self) -> StreamResult {
        match self.state {
            StreamState::Negotiated => {
                self.state = StreamState::Running;
                if let Some(s) = &self.settings {
                    self.pace.start(s.ai.sample_rate, s.ai.sample_block_size.unwrap_or(1));
                }
                debug!("pipeline running");
            }
            StreamState::Running => {}
            state => return Err(StreamError::InvalidState { state, action: "step" }),
        }

        let result = self.exchange();
        if let Err(e) = &result {
            warn!(error = %e, iteration = self.iterations, "pipeline failed");
            self.stop();
        }
        result
    }

    fn exchange(&mut self) -> StreamResult {
        let (Some(input), Some(output)) = (self.input.as_mut(), self.output.as_mut()) else {
            return Err(StreamError::InvalidState { state: self.state, action: "step" });
        };

        let block = input.acquire()?;
        let out_channels = output.settings().number_of_channels;
        let peak = block.rows().next().map_or(0.0, peak_abs);

        let out = match self.synth.as_mut() {
            Some(dds) => {
                self.scratch.resize(block.frames(), 0.0);
                dds.fill(&mut self.scratch);
                SampleBlock::fan_out(&self.scratch, out_channels)
            }
            None => {
                let available = block.channels();
                block.select_channels(out_channels).ok_or(ConfigurationError::ChannelShortfall {
                    needed: out_channels,
                    available,
                })?
            }
        };
        output.write(out)?;

        self.iterations += 1;
        self.pace.tick(self.iterations, peak);
        Ok(())
    }

    /// Negotiate if needed, then iterate while `keep_running(iterations)`
    /// returns true. The predicate is consulted before every iteration, so a
    /// stop is observed within one block period. Devices are released before
    /// this returns, on success and on error.
    pub fn run(&mut self, mut keep_running: impl FnMut(u64) -> bool) -> StreamResult<u64> {
        if self.state == StreamState::Uninitialized {
            self.negotiate()?;
        }
        let result = loop {
            if !keep_running(self.iterations) {
                break Ok(self.iterations);
            }
            if let Err(e) = self.step() {
                break Err(e);
            }
        };
        self.stop();
        result
    }

    /// Stop and release both devices. Idempotent.
    pub fn stop(&mut self) {
        if self.state == StreamState::Stopped {
            return;
        }
        self.state = StreamState::Stopped;
        self.input.take();
        self.output.take();
        info!(iterations = self.iterations, "pipeline stopped");
    }
}

/// Wall-clock check that the loop keeps up with the master clock.
#[derive(Debug, Default)]
struct PaceMonitor {
    start: Option<Instant>,
    sample_rate: u32,
    block_size: usize,
}

impl PaceMonitor {
    fn start(&mut self, sample_rate: u32, block_size: usize) {
        self.start = Some(Instant::now());
        self.sample_rate = sample_rate;
        self.block_size = block_size;
    }

    fn tick(&self, iterations: u64, peak: Sample) {
        if iterations % REPORT_INTERVAL != 0 {
            return;
        }
        let Some(start) = self.start else { return };
        let expected = expected_iterations(start.elapsed(), self.sample_rate, self.block_size);
        let lag = expected.saturating_sub(iterations);
        info!(iterations, expected, peak, "progress");
        if lag > 1 {
            warn!(iterations, expected, lag, "loop is falling behind the sample clock");
        }
    }
}

/// Iterations the sample clock has produced after `elapsed`
/// (`elapsed * sample_rate / block_size`, rounded).
pub fn expected_iterations(elapsed: Duration, sample_rate: u32, block_size: usize) -> u64 {
    if block_size == 0 {
        return 0;
    }
    (elapsed.as_secs_f64() * f64::from(sample_rate) / block_size as f64 + 0.5) as u64
}

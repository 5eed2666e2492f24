//! State shared between the controller and the streaming worker.
//!
//! Each field has one writer. The controller only ever sets `stop`; the
//! worker owns everything else through a [`WorkerPort`]. Nothing here blocks,
//! so the worker can record progress every iteration.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::settings::PipelineSettings;

/// Where the worker is in its lifetime.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerStatus {
    Starting = 0,
    Running = 1,
    Finished = 2,
    Failed = 3,
}

impl WorkerStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => WorkerStatus::Running,
            2 => WorkerStatus::Finished,
            3 => WorkerStatus::Failed,
            _ => WorkerStatus::Starting,
        }
    }

    /// True once the worker has left its loop.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerStatus::Finished | WorkerStatus::Failed)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Finished => "finished",
            WorkerStatus::Failed => "failed",
        })
    }
}

#[derive(Debug)]
pub struct SharedControlState {
    stop: AtomicBool,
    counter: AtomicU64,
    status: AtomicU8,
    settings: OnceLock<PipelineSettings>,
}

impl Default for SharedControlState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedControlState {
    pub fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            counter: AtomicU64::new(0),
            status: AtomicU8::new(WorkerStatus::Starting as u8),
            settings: OnceLock::new(),
        }
    }

    /// Ask the worker to finish its current iteration and exit.
    #[inline] pub fn request_stop(&self) { self.stop.store(true, Ordering::Release); }

    #[inline] pub fn stop_requested(&self) -> bool { self.stop.load(Ordering::Acquire) }

    /// Iterations completed so far.
    #[inline] pub fn counter(&self) -> u64 { self.counter.load(Ordering::Acquire) }

    #[inline] pub fn status(&self) -> WorkerStatus { WorkerStatus::from_u8(self.status.load(Ordering::Acquire)) }

    /// Settings published by the worker after negotiation.
    #[inline] pub fn settings(&self) -> Option<&PipelineSettings> { self.settings.get() }

    /// Worker-side writer. Hand exactly one of these to the worker.
    pub fn worker_port(&self) -> WorkerPort<'_> {
        WorkerPort { state: self }
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            status: self.status(),
            counter: self.counter(),
            stop_requested: self.stop_requested(),
            settings: self.settings().cloned(),
        }
    }
}

/// The worker's write access to [`SharedControlState`].
#[derive(Debug)]
pub struct WorkerPort<'a> {
    state: &'a SharedControlState,
}

impl WorkerPort<'_> {
    #[inline] pub fn stop_requested(&self) -> bool { self.state.stop_requested() }

    #[inline] pub fn record_iterations(&self, n: u64) { self.state.counter.store(n, Ordering::Release); }

    #[inline] pub fn set_status(&self, status: WorkerStatus) { self.state.status.store(status as u8, Ordering::Release); }

    /// Publish negotiated settings. Only the first call has an effect.
    pub fn publish_settings(&self, settings: &PipelineSettings) {
        let _ = self.state.settings.set(settings.clone());
    }
}

/// Point-in-time copy of the shared state, for display.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlSnapshot {
    pub status: WorkerStatus,
    pub counter: u64,
    pub stop_requested: bool,
    pub settings: Option<PipelineSettings>,
}

impl fmt::Display for ControlSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "status: {}", self.status)?;
        writeln!(f, "counter: {}", self.counter)?;
        writeln!(f, "stop: {}", self.stop_requested)?;
        match &self.settings {
            Some(s) => write!(f, "{s}"),
            None => writeln!(f, "settings: not negotiated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn controller_and_worker_views() {
        let state = SharedControlState::new();
        assert_eq!(state.status(), WorkerStatus::Starting);
        assert!(!state.stop_requested());

        let port = state.worker_port();
        port.set_status(WorkerStatus::Running);
        port.record_iterations(42);
        assert_eq!(state.counter(), 42);

        state.request_stop();
        assert!(port.stop_requested());
        port.set_status(WorkerStatus::Finished);
        assert!(state.status().is_terminal());
    }

    #[test]
    fn settings_publish_once() {
        let state = SharedControlState::new();
        let ai = Settings::input(&"Dev2/ai0:15".parse().unwrap(), 16, 10_000, 10);
        let ao = Settings::output(&"Dev3/ao0:7".parse().unwrap(), 8, 10_000);
        let first = PipelineSettings { ai: ai.clone(), ao: ao.clone(), dds: None };
        let mut second = first.clone();
        second.ai.sample_rate = 1;

        let port = state.worker_port();
        port.publish_settings(&first);
        port.publish_settings(&second);
        assert_eq!(state.settings(), Some(&first));

        let dump = state.snapshot().to_string();
        assert!(dump.starts_with("status: starting\ncounter: 0\nstop: false\nai:\n"));
        assert!(dump.contains("physical_channels: Dev3/ao0:7"));
    }

    #[test]
    fn snapshot_without_settings() {
        let dump = SharedControlState::new().snapshot().to_string();
        assert!(dump.ends_with("settings: not negotiated\n"));
    }
}

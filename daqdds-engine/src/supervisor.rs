//! Two-context supervised pipeline.
//!
//! The streaming loop runs on a dedicated `daq-worker` thread. The caller's
//! thread runs the controller. The two share only a [`SharedControlState`].
//! Devices are built inside the worker (device handles need not be `Send`)
//! and are released there, before [`Supervisor::join`] returns.
//!
//! There is no timeout on acquire or write: a stalled device stalls the
//! worker, and with it `join`.

use std::any::Any;
use std::fmt;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use crate::control::run_controller;
use crate::coordinator::StreamCoordinator;
use crate::device::{AcquisitionSource, OutputSink};
use crate::error::{StreamError, StreamResult};
use crate::shared::{ControlSnapshot, SharedControlState, WorkerStatus};

pub const WORKER_THREAD_NAME: &str = "daq-worker";

/// Outcome of a cleanly finished worker.
#[derive(Clone, Debug, PartialEq)]
pub struct FinalReport {
    pub iterations: u64,
    pub snapshot: ControlSnapshot,
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.snapshot)
    }
}

pub struct Supervisor {
    state: Arc<SharedControlState>,
    worker: JoinHandle<StreamResult<u64>>,
}

impl Supervisor {
    /// Start the worker. `build` runs on the worker thread and opens the
    /// devices; the worker then negotiates, publishes the settings and
    /// streams until a stop is requested or a device fails.
    pub fn spawn<F, I, O>(build: F) -> StreamResult<Self>
    where
        F: FnOnce() -> StreamResult<StreamCoordinator<I, O>> + Send + 'static,
        I: AcquisitionSource + 'static,
        O: OutputSink + 'static,
    {
        let state = Arc::new(SharedControlState::new());
        let worker_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || worker_main(&worker_state, build))
            .map_err(|e| StreamError::ProcessFailure(format!("cannot start worker: {e}")))?;
        Ok(Self { state, worker })
    }

    pub fn state(&self) -> &SharedControlState {
        &self.state
    }

    pub fn request_stop(&self) {
        self.state.request_stop();
    }

    /// Run the interactive controller on this thread until it sets `stop`.
    pub fn control<R: BufRead, W: Write>(&self, input: R, out: W) -> StreamResult<usize> {
        run_controller(&self.state, input, out)
    }

    /// Wait for the worker. A worker that failed or panicked is reported as
    /// an error even if a stop had been requested.
    pub fn join(self) -> StreamResult<FinalReport> {
        let outcome = self.worker.join();
        match outcome {
            Ok(Ok(iterations)) => Ok(FinalReport { iterations, snapshot: self.state.snapshot() }),
            Ok(Err(e)) => Err(e),
            Err(payload) => {
                self.state.worker_port().set_status(WorkerStatus::Failed);
                let msg = panic_message(payload);
                error!(%msg, "worker panicked");
                Err(StreamError::ProcessFailure(format!("worker panicked: {msg}")))
            }
        }
    }
}

/// Spawn, control from `input`/`out`, then join. If the controller's own
/// I/O fails the worker is still stopped and joined (its outcome is logged)
/// before the controller error is returned.
pub fn supervise<F, I, O, R, W>(build: F, input: R, out: W) -> StreamResult<FinalReport>
where
    F: FnOnce() -> StreamResult<StreamCoordinator<I, O>> + Send + 'static,
    I: AcquisitionSource + 'static,
    O: OutputSink + 'static,
    R: BufRead,
    W: Write,
{
    let sup = Supervisor::spawn(build)?;
    if let Err(e) = sup.control(input, out) {
        error!(error = %e, "controller failed, stopping worker");
        sup.request_stop();
        match sup.join() {
            Ok(report) => info!(iterations = report.iterations, "worker stopped after controller failure"),
            Err(worker) => error!(error = %worker, "worker also failed"),
        }
        return Err(e);
    }
    sup.join()
}

fn worker_main<F, I, O>(state: &SharedControlState, build: F) -> StreamResult<u64>
where
    F: FnOnce() -> StreamResult<StreamCoordinator<I, O>>,
    I: AcquisitionSource,
    O: OutputSink,
{
    let port = state.worker_port();
    let result = (|| -> StreamResult<u64> {
        let mut coordinator = build()?;
        let settings = coordinator.negotiate()?.clone();
        port.publish_settings(&settings);
        port.set_status(WorkerStatus::Running);
        info!("worker streaming");
        coordinator.run(|n| {
            port.record_iterations(n);
            !port.stop_requested()
        })
    })();

    match &result {
        Ok(n) => {
            port.record_iterations(*n);
            port.set_status(WorkerStatus::Finished);
            info!(iterations = n, "worker finished");
        }
        Err(e) => {
            port.set_status(WorkerStatus::Failed);
            error!(error = %e, "worker failed");
        }
    }
    result
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

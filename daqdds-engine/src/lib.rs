//! daqdds engine: block-synchronized acquisition → DDS → output.
//!
//! Crate layout:
//! - [`settings`]    : channel specifiers and per-stream `Settings` snapshots
//! - [`device`]      : `AcquisitionSource` / `OutputSink` capabilities
//! - [`sim`]         : simulated devices (deterministic, optionally paced)
//! - `cpal_io`       : host audio devices through cpal (feature `realtime`)
//! - [`coordinator`] : the acquire → synthesize → write state machine
//! - [`shared`], [`control`], [`supervisor`] : worker thread + interactive controller
//! - [`config`]      : JSON configuration and device opening
//!
//! The acquisition device is the only clock. Nothing in the loop sleeps or
//! times itself; every iteration waits on exactly one `acquire`.

pub mod config;
pub mod control;
pub mod coordinator;
#[cfg(feature = "realtime")]
pub mod cpal_io;
pub mod device;
pub mod error;
pub mod settings;
pub mod shared;
pub mod sim;
pub mod supervisor;

pub use config::{Backend, DdsConfig, PipelineConfig};
pub use control::{run_controller, Command, PROMPT};
pub use coordinator::{StreamCoordinator, StreamState};
pub use device::{AcquisitionSource, OutputSink};
pub use error::{ConfigurationError, DeviceError, StreamError, StreamResult};
pub use settings::{ChannelKind, ChannelSpec, PipelineSettings, Settings};
pub use shared::{ControlSnapshot, SharedControlState, WorkerStatus};
pub use supervisor::{supervise, FinalReport, Supervisor};

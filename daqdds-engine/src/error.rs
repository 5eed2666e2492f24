//! Error taxonomy for the streaming pipeline.
//!
//! - [`ConfigurationError`]: raised before any data exchange (bad channel
//!   spec, rate or channel negotiation mismatch, unreadable config).
//! - [`DeviceError`]: fatal device-level failures during streaming. Never
//!   retried: after a timing violation the master clock can no longer be trusted.
//! - [`StreamError`]: what the coordinator and supervisor return.

use std::path::PathBuf;

use daqdds_core::error::ConfigError;

use crate::coordinator::StreamState;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid channel specifier '{spec}': {reason}")]
    ChannelSpec { spec: String, reason: &'static str },

    #[error("channel specifier '{spec}' is not an {expected} channel")]
    ChannelKind { spec: String, expected: &'static str },

    #[error("block size must be positive")]
    ZeroBlockSize,

    #[error("block of {block_size} samples does not fit the {capacity}-sample device buffer")]
    BlockTooLarge { block_size: usize, capacity: usize },

    #[error("{stage} sample rate {actual} Hz does not match acquisition rate {expected} Hz")]
    RateMismatch { stage: &'static str, expected: u32, actual: u32 },

    #[error("pass-through needs {needed} input channels, acquisition provides {available}")]
    ChannelShortfall { needed: usize, available: usize },

    #[error("unknown waveform '{0}' (expected sine, tri or saw)")]
    UnknownWaveform(String),

    #[error("invalid simulated signal '{signal}': {reason}")]
    InvalidSignal { signal: String, reason: &'static str },

    #[error("no device for '{spec}'")]
    DeviceNotFound { spec: String },

    #[error("device for '{spec}' rejected the configuration: {reason}")]
    Unsupported { spec: String, reason: String },

    #[error("cannot read config file {}: {source}", path.display())]
    ConfigFile { path: PathBuf, #[source] source: std::io::Error },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("input buffer overrun on {device}: acquisition fell behind the sample clock")]
    Overrun { device: String },

    #[error("output buffer underrun on {device}: writes fell behind the sample clock")]
    Underrun { device: String },

    #[error("output buffer full on {device}: {pending} samples do not fit")]
    BufferFull { device: String, pending: usize },

    #[error("block has {actual} channels, {device} expects {expected}")]
    ChannelMismatch { device: String, expected: usize, actual: usize },

    #[error("{device} disconnected")]
    Disconnected { device: String },

    #[error("{device}: {message}")]
    Backend { device: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("device I/O error: {0}")]
    DeviceIo(#[from] DeviceError),

    #[error("control channel I/O failed: {0}")]
    ControlChannel(#[from] std::io::Error),

    #[error("worker failed: {0}")]
    ProcessFailure(String),

    #[error("cannot {action} while the pipeline is {state:?}")]
    InvalidState { state: StreamState, action: &'static str },
}

impl From<ConfigError> for StreamError {
    fn from(e: ConfigError) -> Self {
        StreamError::Configuration(ConfigurationError::Core(e))
    }
}

/// Result type for pipeline operations
pub type StreamResult<T = ()> = Result<T, StreamError>;

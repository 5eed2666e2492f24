//! Construction errors for core building blocks.

/// Invalid parameters handed to a block or synthesizer constructor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("waveform table is empty")]
    EmptyWaveform,

    #[error("sample rate must be positive (got {0})")]
    InvalidSampleRate(u32),

    #[error("waveform rate must be positive and finite (got {0})")]
    InvalidWaveformRate(f64),

    #[error("waveform rate {rate} is too high for a table of {len} samples")]
    TuningWordOverflow { rate: f64, len: usize },

    #[error("block shape mismatch: expected {expected} samples, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("rows have unequal lengths ({first} vs {other})")]
    RaggedRows { first: usize, other: usize },
}

#![cfg_attr(not(feature = "std"), no_std)]
//! daqdds Core — no_std-ready building blocks for the acquisition/output pipeline.
//!
//! Features
//! - `std`       : (default) use the Rust standard library
//! - `no-std`    : build with `#![no_std]` + `alloc` and use `libm` for math
//! - `micromath` : use `micromath` for table generation instead of `libm`
//!
//! Modules
//! - [`block`]     : `SampleBlock`, the channels × samples matrix moved between stages
//! - [`dds`]       : direct digital synthesis resampler and its phase accumulator
//! - [`wavetable`] : standard single-period tables (sine, triangle, saw)
//! - [`dsp`]       : math backend and small numeric helpers
//! - [`error`]     : construction errors
//!
//! Design
//! - No device or threading code here; the engine crate owns the real-time loop
//! - Per-sample paths are allocation-free (`Dds::fill`)

extern crate alloc;

pub mod block;
pub mod dds;
pub mod dsp;
pub mod error;
pub mod wavetable;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::block::SampleBlock;
    pub use crate::dds::{Dds, DdsSettings, PhaseAccumulator};
    pub use crate::dsp::{peak_abs, Sample};
    pub use crate::error::ConfigError;
    pub use crate::wavetable::Wave;
}

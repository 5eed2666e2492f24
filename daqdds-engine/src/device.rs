//! Device capabilities the coordinator is built on.
//!
//! Opening a device is backend specific (see [`crate::sim`] and, with the
//! `realtime` feature, `crate::cpal_io`); once open, a device reports its
//! negotiated [`Settings`] and exchanges [`SampleBlock`]s. Handles release
//! their device on drop.

use daqdds_core::block::SampleBlock;

use crate::error::{ConfigurationError, DeviceError};
use crate::settings::Settings;

/// Seconds of samples a device buffer holds (per channel: `sample_rate * 5`).
pub const DEVICE_BUFFER_SECONDS: u32 = 5;

/// Samples per channel a device buffer holds at `sample_rate`.
pub fn buffer_capacity(sample_rate: u32) -> usize {
    sample_rate as usize * DEVICE_BUFFER_SECONDS as usize
}

/// An input block must be positive and fit in the device buffer, or the
/// acquire waiting for it could never complete.
pub(crate) fn check_block_size(block_size: usize, sample_rate: u32) -> Result<(), ConfigurationError> {
    if block_size == 0 {
        return Err(ConfigurationError::ZeroBlockSize);
    }
    let capacity = buffer_capacity(sample_rate);
    if block_size > capacity {
        return Err(ConfigurationError::BlockTooLarge { block_size, capacity });
    }
    Ok(())
}

/// Blocking producer of fixed-size input blocks; the pipeline's master clock.
pub trait AcquisitionSource {
    /// Snapshot negotiated when the device was opened.
    fn settings(&self) -> &Settings;

    /// Block until `sample_block_size` samples per channel have been captured
    /// and return them as a `(number_of_channels, sample_block_size)` block.
    ///
    /// The first call starts the device. Overruns are fatal.
    fn acquire(&mut self) -> Result<SampleBlock, DeviceError>;
}

/// Non-blocking consumer that queues blocks for playback.
pub trait OutputSink {
    /// Snapshot negotiated when the device was opened.
    fn settings(&self) -> &Settings;

    /// Queue `block` (any width, `number_of_channels` rows) and return
    /// without waiting for playback. The device starts after the first block
    /// has been queued. Underruns are fatal.
    fn write(&mut self, block: SampleBlock) -> Result<(), DeviceError>;
}

impl<T: AcquisitionSource + ?Sized> AcquisitionSource for Box<T> {
    fn settings(&self) -> &Settings {
        (**self).settings()
    }

    fn acquire(&mut self) -> Result<SampleBlock, DeviceError> {
        (**self).acquire()
    }
}

impl<T: OutputSink + ?Sized> OutputSink for Box<T> {
    fn settings(&self) -> &Settings {
        (**self).settings()
    }

    fn write(&mut self, block: SampleBlock) -> Result<(), DeviceError> {
        (**self).write(block)
    }
}

/// Reject a block whose channel count does not match the sink.
pub(crate) fn check_channels(settings: &Settings, block: &SampleBlock) -> Result<(), DeviceError> {
    if block.channels() != settings.number_of_channels {
        return Err(DeviceError::ChannelMismatch {
            device: settings.physical_channels.clone(),
            expected: settings.number_of_channels,
            actual: block.channels(),
        });
    }
    Ok(())
}

//! Host audio devices as DAQ channels (feature `realtime`).
//!
//! - `Dev<n>` selects the n-th input (or output) device the host enumerates,
//!   counting from 1; `Dev0` is the host default.
//! - The channel range selects device channels, so `Dev1/ai0:1` is the first
//!   two channels of the first capture device.
//! - Each stream moves interleaved `f32` through an `rtrb` ring sized for
//!   five seconds. The audio callback never blocks: a full input ring is an
//!   overrun, an empty output ring is an underrun. Both are reported by the
//!   next `acquire`/`write`.
//! - An output starts playing once [`OUTPUT_PREROLL`] worth of frames is
//!   queued, and only counts shortfalls as underruns after one callback has
//!   been served entirely from the ring.
//!
//! `cpal::Stream` is not `Send`; open these devices on the thread that runs
//! the coordinator.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample as CpalSample, SampleFormat, SampleRate, SizedSample};
use daqdds_core::block::SampleBlock;
use daqdds_core::dsp::Sample;
use daqdds_core::error::ConfigError;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, error, info};

use crate::device::{buffer_capacity, check_block_size, check_channels, AcquisitionSource, OutputSink};
use crate::error::{ConfigurationError, DeviceError};
use crate::settings::{ChannelKind, ChannelSpec, Settings};

/// Flags raised from the audio callback.
#[derive(Debug, Default)]
struct StreamFlags {
    xrun: AtomicBool,
    failed: AtomicBool,
}

impl StreamFlags {
    fn error_callback(self: &Arc<Self>, device: String) -> impl FnMut(cpal::StreamError) + Send + 'static {
        let flags = Arc::clone(self);
        move |err| {
            error!(%device, %err, "stream error");
            flags.failed.store(true, Ordering::Release);
        }
    }
}

fn find_device(host: &cpal::Host, spec: &ChannelSpec, raw: &str) -> Result<cpal::Device, ConfigurationError> {
    let backend = |e: &dyn fmt::Display| ConfigurationError::Unsupported { spec: raw.to_string(), reason: e.to_string() };
    let nth = spec.device.checked_sub(1).map(|i| i as usize);
    let found = match (spec.kind, nth) {
        (ChannelKind::AnalogInput, None) => host.default_input_device(),
        (ChannelKind::AnalogOutput, None) => host.default_output_device(),
        (ChannelKind::AnalogInput, Some(i)) => host.input_devices().map_err(|e| backend(&e))?.nth(i),
        (ChannelKind::AnalogOutput, Some(i)) => host.output_devices().map_err(|e| backend(&e))?.nth(i),
    };
    found.ok_or_else(|| ConfigurationError::DeviceNotFound { spec: raw.to_string() })
}

/// Narrowest supported config that covers `channels` at exactly `rate`,
/// preferring native `f32`.
fn pick_config(
    ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    channels: u16,
    rate: u32,
) -> Option<cpal::SupportedStreamConfig> {
    ranges
        .filter(|r| r.channels() >= channels)
        .filter(|r| (r.min_sample_rate().0..=r.max_sample_rate().0).contains(&rate))
        .min_by_key(|r| (r.channels(), r.sample_format() != SampleFormat::F32))
        .map(|r| r.with_sample_rate(SampleRate(rate)))
}

fn channels_needed(spec: &ChannelSpec, raw: &str) -> Result<u16, ConfigurationError> {
    u16::try_from(spec.last + 1)
        .map_err(|_| ConfigurationError::Unsupported { spec: raw.to_string(), reason: "channel index out of range".into() })
}

fn unsupported(raw: &str, reason: impl fmt::Display) -> ConfigurationError {
    ConfigurationError::Unsupported { spec: raw.to_string(), reason: reason.to_string() }
}

/// Audio queued on an output before it starts playing.
pub const OUTPUT_PREROLL: Duration = Duration::from_millis(100);

/// Frames to queue before `play()`, never more than the ring holds.
fn preroll_frames(sample_rate: u32, capacity_frames: usize) -> usize {
    let frames = (OUTPUT_PREROLL.as_secs_f64() * f64::from(sample_rate)).ceil() as usize;
    frames.clamp(1, capacity_frames.max(1))
}

/// Block from the two halves of a ring buffer read.
fn block_from_ring(first: &[f32], second: &[f32], channels: usize) -> Result<SampleBlock, ConfigError> {
    let interleaved: Vec<Sample> = first.iter().chain(second).map(|&v| Sample::from(v)).collect();
    SampleBlock::from_interleaved(channels, &interleaved)
}

// ----- Input -----

pub struct CpalInput {
    settings: Settings,
    stream: cpal::Stream,
    consumer: Consumer<f32>,
    flags: Arc<StreamFlags>,
    started: bool,
    poll: Duration,
}

impl CpalInput {
    pub fn open(physical_channels: &str, sample_rate: u32, block_size: usize) -> Result<Self, ConfigurationError> {
        let spec = ChannelSpec::parse_kind(physical_channels, ChannelKind::AnalogInput)?;
        check_block_size(block_size, sample_rate)?;
        let host = cpal::default_host();
        let device = find_device(&host, &spec, physical_channels)?;
        let needed = channels_needed(&spec, physical_channels)?;
        let ranges = device.supported_input_configs().map_err(|e| unsupported(physical_channels, e))?;
        let supported = pick_config(ranges, needed, sample_rate)
            .ok_or_else(|| unsupported(physical_channels, format!("no config with {needed} channels at {sample_rate} Hz")))?;

        let settings = Settings::input(&spec, spec.count(), sample_rate, block_size);
        let capacity = buffer_capacity(sample_rate) * spec.count();
        let (producer, consumer) = RingBuffer::<f32>::new(capacity);
        let flags = Arc::new(StreamFlags::default());

        let config = supported.config();
        let selection = Selection { first: spec.first as usize, count: spec.count(), stride: usize::from(config.channels) };
        let err_fn = flags.error_callback(settings.physical_channels.clone());
        let built = match supported.sample_format() {
            SampleFormat::F32 => build_input::<f32>(&device, &config, selection, producer, Arc::clone(&flags), err_fn),
            SampleFormat::I16 => build_input::<i16>(&device, &config, selection, producer, Arc::clone(&flags), err_fn),
            SampleFormat::U16 => build_input::<u16>(&device, &config, selection, producer, Arc::clone(&flags), err_fn),
            other => return Err(unsupported(physical_channels, format!("sample format {other:?}"))),
        };
        let stream = built.map_err(|e| unsupported(physical_channels, e))?;

        let name = device.name().unwrap_or_default();
        info!(device = %name, channels = %settings.physical_channels, sample_rate, block_size, "cpal input opened");
        let period = Duration::from_secs_f64(block_size as f64 / f64::from(sample_rate));
        Ok(Self {
            settings,
            stream,
            consumer,
            flags,
            started: false,
            poll: (period / 4).max(Duration::from_micros(100)),
        })
    }

    fn device_name(&self) -> String {
        self.settings.physical_channels.clone()
    }
}

#[derive(Copy, Clone, Debug)]
struct Selection {
    first: usize,
    count: usize,
    /// Channels per device frame.
    stride: usize,
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sel: Selection,
    mut producer: Producer<f32>,
    flags: Arc<StreamFlags>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for frame in data.chunks_exact(sel.stride) {
                if producer.slots() < sel.count {
                    flags.xrun.store(true, Ordering::Release);
                    return;
                }
                for &s in &frame[sel.first..sel.first + sel.count] {
                    let _ = producer.push(s.to_sample::<f32>());
                }
            }
        },
        err_fn,
        None,
    )
}

impl AcquisitionSource for CpalInput {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn acquire(&mut self) -> Result<SampleBlock, DeviceError> {
        if !self.started {
            self.stream
                .play()
                .map_err(|e| DeviceError::Backend { device: self.device_name(), message: e.to_string() })?;
            self.started = true;
            debug!(channels = %self.settings.physical_channels, "cpal input started");
        }
        let channels = self.settings.number_of_channels;
        let frames = self.settings.sample_block_size.unwrap_or(1);
        let needed = channels * frames;

        loop {
            if self.flags.xrun.load(Ordering::Acquire) {
                return Err(DeviceError::Overrun { device: self.device_name() });
            }
            if self.flags.failed.load(Ordering::Acquire) {
                return Err(DeviceError::Disconnected { device: self.device_name() });
            }
            if self.consumer.slots() >= needed {
                break;
            }
            thread::sleep(self.poll);
        }

        let chunk = self
            .consumer
            .read_chunk(needed)
            .map_err(|e| DeviceError::Backend { device: self.settings.physical_channels.clone(), message: e.to_string() })?;
        let (a, b) = chunk.as_slices();
        let block = block_from_ring(a, b, channels);
        chunk.commit_all();
        block.map_err(|e| DeviceError::Backend { device: self.device_name(), message: e.to_string() })
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        let _ = self.stream.pause();
        debug!(channels = %self.settings.physical_channels, "cpal input closed");
    }
}

// ----- Output -----

pub struct CpalOutput {
    settings: Settings,
    stream: cpal::Stream,
    producer: Producer<f32>,
    capacity: usize,
    preroll: usize,
    flags: Arc<StreamFlags>,
    playing: bool,
}

impl CpalOutput {
    pub fn open(physical_channels: &str, sample_rate: u32) -> Result<Self, ConfigurationError> {
        let spec = ChannelSpec::parse_kind(physical_channels, ChannelKind::AnalogOutput)?;
        let host = cpal::default_host();
        let device = find_device(&host, &spec, physical_channels)?;
        let needed = channels_needed(&spec, physical_channels)?;
        let ranges = device.supported_output_configs().map_err(|e| unsupported(physical_channels, e))?;
        let supported = pick_config(ranges, needed, sample_rate)
            .ok_or_else(|| unsupported(physical_channels, format!("no config with {needed} channels at {sample_rate} Hz")))?;

        let settings = Settings::output(&spec, spec.count(), sample_rate);
        let capacity = buffer_capacity(sample_rate) * spec.count();
        let (producer, consumer) = RingBuffer::<f32>::new(capacity);
        let flags = Arc::new(StreamFlags::default());
        let preroll = preroll_frames(sample_rate, buffer_capacity(sample_rate)) * spec.count();

        let config = supported.config();
        let selection = Selection { first: spec.first as usize, count: spec.count(), stride: usize::from(config.channels) };
        let err_fn = flags.error_callback(settings.physical_channels.clone());
        let ctx = OutputCtx { sel: selection, consumer, flags: Arc::clone(&flags), armed: false };
        let built = match supported.sample_format() {
            SampleFormat::F32 => build_output::<f32>(&device, &config, ctx, err_fn),
            SampleFormat::I16 => build_output::<i16>(&device, &config, ctx, err_fn),
            SampleFormat::U16 => build_output::<u16>(&device, &config, ctx, err_fn),
            other => return Err(unsupported(physical_channels, format!("sample format {other:?}"))),
        };
        let stream = built.map_err(|e| unsupported(physical_channels, e))?;

        let name = device.name().unwrap_or_default();
        info!(device = %name, channels = %settings.physical_channels, sample_rate, "cpal output opened");
        Ok(Self { settings, stream, producer, capacity, preroll, flags, playing: false })
    }

    fn device_name(&self) -> String {
        self.settings.physical_channels.clone()
    }
}

struct OutputCtx {
    sel: Selection,
    consumer: Consumer<f32>,
    flags: Arc<StreamFlags>,
    /// Set once a callback has been served entirely from the ring.
    armed: bool,
}

/// Fill one output callback from the ring. Frames the ring cannot cover are
/// silent; they are an underrun (returns `true`) only once `armed`.
fn render_output<T>(data: &mut [T], sel: Selection, consumer: &mut Consumer<f32>, armed: &mut bool) -> bool
where
    T: SizedSample + FromSample<f32>,
{
    let mut short = false;
    for frame in data.chunks_exact_mut(sel.stride) {
        frame.fill(T::EQUILIBRIUM);
        if consumer.slots() < sel.count {
            short = true;
            continue;
        }
        for out in &mut frame[sel.first..sel.first + sel.count] {
            if let Ok(v) = consumer.pop() {
                *out = T::from_sample(v);
            }
        }
    }
    if !short {
        *armed = true;
    }
    short && *armed
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut ctx: OutputCtx,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if render_output(data, ctx.sel, &mut ctx.consumer, &mut ctx.armed) {
                ctx.flags.xrun.store(true, Ordering::Release);
            }
        },
        err_fn,
        None,
    )
}

impl OutputSink for CpalOutput {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn write(&mut self, block: SampleBlock) -> Result<(), DeviceError> {
        check_channels(&self.settings, &block)?;
        if self.flags.xrun.load(Ordering::Acquire) {
            return Err(DeviceError::Underrun { device: self.device_name() });
        }
        if self.flags.failed.load(Ordering::Acquire) {
            return Err(DeviceError::Disconnected { device: self.device_name() });
        }
        let pending = block.channels() * block.frames();
        if self.producer.slots() < pending {
            return Err(DeviceError::BufferFull { device: self.device_name(), pending });
        }

        let mut interleaved = vec![0.0_f32; pending];
        block
            .write_interleaved(&mut interleaved, |s| s as f32)
            .map_err(|e| DeviceError::Backend { device: self.device_name(), message: e.to_string() })?;
        for v in interleaved {
            let _ = self.producer.push(v);
        }

        let queued = self.capacity - self.producer.slots();
        if !self.playing && queued >= self.preroll {
            self.stream
                .play()
                .map_err(|e| DeviceError::Backend { device: self.device_name(), message: e.to_string() })?;
            self.playing = true;
            debug!(channels = %self.settings.physical_channels, queued, "cpal output started");
        }
        Ok(())
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.stream.pause();
        debug!(channels = %self.settings.physical_channels, "cpal output closed");
    }
}

// ----- Listing -----

/// One enumerable device, addressed the way channel specifiers address it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub kind: ChannelKind,
    /// `n` in `Dev<n>`.
    pub index: u32,
    pub name: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.kind.prefix();
        let last = self.max_channels.saturating_sub(1);
        write!(f, "Dev{}/{prefix}0:{last}  {}", self.index, self.name)
    }
}

/// Capture devices first, then playback devices, in host order.
pub fn list_devices() -> Result<Vec<DeviceInfo>, ConfigurationError> {
    let host = cpal::default_host();
    let err = |e: &dyn fmt::Display| unsupported(host.id().name(), e);
    let mut out = Vec::new();

    for (i, dev) in host.input_devices().map_err(|e| err(&e))?.enumerate() {
        let max_channels = dev.supported_input_configs().map(|r| r.map(|c| c.channels()).max().unwrap_or(0)).unwrap_or(0);
        out.push(DeviceInfo {
            kind: ChannelKind::AnalogInput,
            index: i as u32 + 1,
            name: dev.name().unwrap_or_default(),
            max_channels,
        });
    }
    for (i, dev) in host.output_devices().map_err(|e| err(&e))?.enumerate() {
        let max_channels = dev.supported_output_configs().map(|r| r.map(|c| c.channels()).max().unwrap_or(0)).unwrap_or(0);
        out.push(DeviceInfo {
            kind: ChannelKind::AnalogOutput,
            index: i as u32 + 1,
            name: dev.name().unwrap_or_default(),
            max_channels,
        });
    }
    Ok(out)
}

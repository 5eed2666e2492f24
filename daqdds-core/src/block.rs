//! `SampleBlock`: the channels × samples matrix moved between pipeline stages.
//!
//! Storage is channel-major (one contiguous row per channel) because every
//! producer in the pipeline works per channel: the synthesizer writes a mono
//! row, pass-through routing keeps the first rows. Frame-oriented device APIs
//! go through [`SampleBlock::from_interleaved`] / [`SampleBlock::write_interleaved`].

use alloc::vec;
use alloc::vec::Vec;

use crate::dsp::Sample;
use crate::error::ConfigError;

/// A `channels × frames` matrix of samples.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBlock {
    channels: usize,
    frames: usize,
    data: Vec<Sample>,
}

impl SampleBlock {
    /// Zero-filled block.
    pub fn zeros(channels: usize, frames: usize) -> Self {
        Self { channels, frames, data: vec![0.0; channels * frames] }
    }

    /// Build from one row per channel. All rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<Sample>>) -> Result<Self, ConfigError> {
        let channels = rows.len();
        let frames = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(channels * frames);
        for row in rows {
            if row.len() != frames {
                return Err(ConfigError::RaggedRows { first: frames, other: row.len() });
            }
            data.extend_from_slice(&row);
        }
        Ok(Self { channels, frames, data })
    }

    /// De-interleave frame-ordered samples (`[c0 c1 .. c0 c1 ..]`).
    pub fn from_interleaved(channels: usize, interleaved: &[Sample]) -> Result<Self, ConfigError> {
        if channels == 0 || interleaved.len() % channels != 0 {
            let expected = if channels == 0 { 0 } else { interleaved.len() - interleaved.len() % channels };
            return Err(ConfigError::ShapeMismatch { expected, actual: interleaved.len() });
        }
        let frames = interleaved.len() / channels;
        let mut block = Self::zeros(channels, frames);
        for (f, frame) in interleaved.chunks_exact(channels).enumerate() {
            for (ch, &s) in frame.iter().enumerate() {
                block.data[ch * frames + f] = s;
            }
        }
        Ok(block)
    }

    /// Repeat one mono row on every channel.
    pub fn fan_out(mono: &[Sample], channels: usize) -> Self {
        let mut data = Vec::with_capacity(mono.len() * channels);
        for _ in 0..channels {
            data.extend_from_slice(mono);
        }
        Self { channels, frames: mono.len(), data }
    }

    #[inline] pub fn channels(&self) -> usize { self.channels }

    /// Samples per channel (the block width).
    #[inline] pub fn frames(&self) -> usize { self.frames }

    #[inline] pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// Row of channel `ch`. Panics if `ch >= channels()`.
    #[inline]
    pub fn channel(&self, ch: usize) -> &[Sample] {
        &self.data[ch * self.frames..(ch + 1) * self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [Sample] {
        &mut self.data[ch * self.frames..(ch + 1) * self.frames]
    }

    /// Iterate over channel rows.
    pub fn rows(&self) -> impl Iterator<Item = &[Sample]> + '_ {
        (0..self.channels).map(move |ch| self.channel(ch))
    }

    /// Channel-major storage.
    #[inline] pub fn as_slice(&self) -> &[Sample] { &self.data }

    /// Keep only the first `n` channels. Returns `None` when the block has fewer.
    pub fn select_channels(mut self, n: usize) -> Option<Self> {
        if n > self.channels {
            return None;
        }
        self.data.truncate(n * self.frames);
        self.channels = n;
        Some(self)
    }

    /// Write frame-ordered samples into `out`, converting each with `conv`.
    /// `out` must hold exactly `channels * frames` values.
    pub fn write_interleaved<T>(&self, out: &mut [T], conv: impl Fn(Sample) -> T) -> Result<(), ConfigError> {
        if out.len() != self.data.len() {
            return Err(ConfigError::ShapeMismatch { expected: self.data.len(), actual: out.len() });
        }
        for (f, frame) in out.chunks_exact_mut(self.channels.max(1)).enumerate() {
            for (ch, o) in frame.iter_mut().enumerate() {
                *o = conv(self.data[ch * self.frames + f]);
            }
        }
        Ok(())
    }
}

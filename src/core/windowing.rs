//! Window management for collecting samples into fixed-size windows.
//!
//! Samples are accumulated in arrival order until the window holds
//! `sample_rate × window_sec` of them. Draining hands the window downstream
//! and starts the next one empty.

use crate::acquisition::types::Sample;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A block of consecutive samples processed as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    /// Zero-based position of this window within the session
    pub index: usize,
    /// Channels per sample
    pub channel_count: usize,
    /// Nominal sample rate in Hz
    pub sample_rate: u32,
    /// Target number of samples for a full window
    pub capacity: usize,
    /// Samples in arrival order
    pub samples: Vec<Sample>,
}

impl Window {
    /// Number of samples in this window.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the window has any samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the window reached its target size.
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Timestamp of the first sample.
    pub fn start_timestamp(&self) -> Option<f64> {
        self.samples.first().map(|s| s.timestamp)
    }

    /// Timestamp of the last sample.
    pub fn end_timestamp(&self) -> Option<f64> {
        self.samples.last().map(|s| s.timestamp)
    }

    /// Nominal duration covered by the samples, in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// The sequence of values for one channel.
    pub fn channel(&self, channel: usize) -> Vec<f64> {
        self.samples
            .iter()
            .map(|s| s.values.get(channel).copied().unwrap_or(0.0))
            .collect()
    }
}

/// Errors raised when pushing into a [`WindowBuffer`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window is full ({capacity} samples); drain it first")]
    Full { capacity: usize },

    #[error("sample has {actual} channels, expected {expected}")]
    ChannelMismatch { expected: usize, actual: usize },
}

/// Accumulates samples until a window is complete.
pub struct WindowBuffer {
    channel_count: usize,
    sample_rate: u32,
    capacity: usize,
    samples: Vec<Sample>,
    next_index: usize,
}

impl WindowBuffer {
    /// Create a buffer holding `window_sec` seconds at `sample_rate`.
    pub fn new(channel_count: usize, sample_rate: u32, window_sec: f64) -> Self {
        let capacity = (f64::from(sample_rate) * window_sec).round().max(1.0) as usize;
        Self::with_capacity(channel_count, sample_rate, capacity)
    }

    /// Create a buffer holding exactly `capacity` samples per window.
    pub fn with_capacity(channel_count: usize, sample_rate: u32, capacity: usize) -> Self {
        Self {
            channel_count,
            sample_rate,
            capacity: capacity.max(1),
            samples: Vec::with_capacity(capacity.max(1)),
            next_index: 0,
        }
    }

    /// Samples per full window.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples accumulated in the current window.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of windows drained so far.
    pub fn windows_drained(&self) -> usize {
        self.next_index
    }

    /// Append a sample to the current window.
    ///
    /// Rejects samples of the wrong width and samples pushed into a window
    /// that is already complete.
    pub fn push(&mut self, sample: Sample) -> Result<(), WindowError> {
        if sample.channel_count() != self.channel_count {
            return Err(WindowError::ChannelMismatch {
                expected: self.channel_count,
                actual: sample.channel_count(),
            });
        }
        if self.is_ready() {
            return Err(WindowError::Full {
                capacity: self.capacity,
            });
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Check if the current window reached its target size.
    pub fn is_ready(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Hand off the current window, full or not, and start the next one.
    pub fn drain(&mut self) -> Window {
        let samples = std::mem::replace(&mut self.samples, Vec::with_capacity(self.capacity));
        let window = Window {
            index: self.next_index,
            channel_count: self.channel_count,
            sample_rate: self.sample_rate,
            capacity: self.capacity,
            samples,
        };
        self.next_index += 1;
        window
    }
}

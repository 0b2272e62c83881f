//! Sample and source types shared by the live and synthetic acquisition paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A single multi-channel reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// One value per channel, in channel order
    pub values: Vec<f64>,
    /// Acquisition timestamp in fractional seconds
    pub timestamp: f64,
}

impl Sample {
    pub fn new(values: Vec<f64>, timestamp: f64) -> Self {
        Self { values, timestamp }
    }

    /// Number of channels in this sample.
    pub fn channel_count(&self) -> usize {
        self.values.len()
    }
}

/// Which variant produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// External EEG stream
    Live,
    /// Seeded pseudo-random generator
    Synthetic,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Live => write!(f, "live"),
            SourceMode::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Outcome of a single pull.
#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    Sample(Sample),
    /// Nothing arrived before the timeout elapsed
    Timeout,
}

/// Errors raised while discovering or reading an upstream stream.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Socket or stream I/O failure
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Discovery returned nothing
    #[error("no {0} stream found")]
    NoStreams(String),

    /// Stream width does not match the session configuration
    #[error("stream has {actual} channels, expected {expected}")]
    ChannelMismatch { expected: usize, actual: usize },

    /// Malformed handshake or frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Reader side went away
    #[error("stream disconnected")]
    Disconnected,
}

/// Anything that can produce the next sample of a session.
pub trait SampleSource: Send {
    /// Variant of this source.
    fn mode(&self) -> SourceMode;

    /// Pull the next sample, waiting at most `timeout`.
    fn next(&mut self, timeout: Duration) -> Result<Pull, SourceError>;
}

//! Feature records handed to the persistence collaborator.
//!
//! One record is emitted per completed window. It carries the band powers of
//! every channel and the timestamp of the window's first sample.

use crate::acquisition::types::SourceMode;
use crate::core::bands::BandPower;
use crate::core::windowing::Window;
use serde::Serialize;
use uuid::Uuid;

/// Band powers of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelFeatures {
    /// Zero-based channel index
    pub channel: usize,
    pub bands: BandPower,
}

/// Features of one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub session_id: String,
    pub window_index: usize,
    /// Timestamp of the first sample in the window
    pub timestamp: f64,
    pub sample_count: usize,
    pub mode: SourceMode,
    /// Machine the record was produced on
    pub host: String,
    pub channels: Vec<ChannelFeatures>,
}

impl FeatureRecord {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Packages band powers into [`FeatureRecord`]s.
pub struct FeatureEmitter {
    session_id: Uuid,
    host: String,
    emitted: usize,
}

impl FeatureEmitter {
    /// Create an emitter with a fresh session ID.
    pub fn new() -> Self {
        Self::with_session_id(Uuid::new_v4())
    }

    pub fn with_session_id(session_id: Uuid) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            session_id,
            host,
            emitted: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Records emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Build the record for `window` from its per-channel band powers.
    ///
    /// `timestamp` is the first sample's timestamp; an empty window falls
    /// back to 0.
    pub fn emit(
        &mut self,
        band_powers: Vec<BandPower>,
        timestamp: f64,
        window: &Window,
        mode: SourceMode,
    ) -> FeatureRecord {
        self.emitted += 1;

        FeatureRecord {
            session_id: self.session_id.to_string(),
            window_index: window.index,
            timestamp,
            sample_count: window.len(),
            mode,
            host: self.host.clone(),
            channels: band_powers
                .into_iter()
                .enumerate()
                .map(|(channel, bands)| ChannelFeatures { channel, bands })
                .collect(),
        }
    }
}

impl Default for FeatureEmitter {
    fn default() -> Self {
        Self::new()
    }
}

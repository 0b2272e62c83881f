//! Persistence of raw samples and feature records.
//!
//! A [`RecordSink`] receives every drained window's samples and every emitted
//! [`FeatureRecord`]. [`FileSink`] writes CSV and JSON tables to a directory;
//! [`MemorySink`] keeps everything in memory.

pub mod files;

use crate::core::bands::BandPower;
use crate::core::record::FeatureRecord;
use crate::core::windowing::Window;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

pub use files::{FileSink, FEATURES_CSV, FEATURES_JSON, RAW_CSV};

/// Errors raised while persisting.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sink already finished")]
    Finished,
}

/// Downstream persistence collaborator.
pub trait RecordSink {
    /// Persist the raw samples of a drained window.
    fn persist_samples(&mut self, window: &Window) -> Result<(), ExportError>;

    /// Persist one feature record.
    fn persist_record(&mut self, record: &FeatureRecord) -> Result<(), ExportError>;

    /// Flush everything. Nothing may be persisted afterwards.
    fn finish(&mut self) -> Result<(), ExportError>;
}

/// Raw table column names: `ch1..chN`.
pub fn channel_names(channel_count: usize) -> Vec<String> {
    (1..=channel_count).map(|i| format!("ch{i}")).collect()
}

/// One channel of one record, flattened into a table row.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub window: usize,
    pub channel: String,
    pub bands: BandPower,
    pub timestamp: f64,
}

impl FeatureRow {
    /// Flatten `record` into one row per channel.
    pub fn from_record(record: &FeatureRecord) -> Vec<FeatureRow> {
        record
            .channels
            .iter()
            .map(|c| FeatureRow {
                window: record.window_index,
                channel: format!("ch{}", c.channel + 1),
                bands: c.bands.clone(),
                timestamp: record.timestamp,
            })
            .collect()
    }

    /// Cells in `window,channel,<bands…>,timestamp` order.
    pub fn cells(&self) -> Vec<String> {
        let mut cells = Vec::with_capacity(self.bands.len() + 3);
        cells.push(self.window.to_string());
        cells.push(self.channel.clone());
        cells.extend(self.bands.iter().map(|(_, power)| power.to_string()));
        cells.push(self.timestamp.to_string());
        cells
    }
}

// Keys stay in column order; NaN powers become null.
impl Serialize for FeatureRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.bands.len() + 3))?;
        map.serialize_entry("window", &self.window)?;
        map.serialize_entry("channel", &self.channel)?;
        for (name, power) in self.bands.iter() {
            map.serialize_entry(name, &power)?;
        }
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.end()
    }
}

/// Sink that keeps everything it receives.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub samples: Vec<crate::acquisition::types::Sample>,
    pub records: Vec<FeatureRecord>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feature records flattened to rows.
    pub fn rows(&self) -> Vec<FeatureRow> {
        self.records.iter().flat_map(FeatureRow::from_record).collect()
    }
}

impl RecordSink for MemorySink {
    fn persist_samples(&mut self, window: &Window) -> Result<(), ExportError> {
        if self.finished {
            return Err(ExportError::Finished);
        }
        self.samples.extend(window.samples.iter().cloned());
        Ok(())
    }

    fn persist_record(&mut self, record: &FeatureRecord) -> Result<(), ExportError> {
        if self.finished {
            return Err(ExportError::Finished);
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        self.finished = true;
        Ok(())
    }
}

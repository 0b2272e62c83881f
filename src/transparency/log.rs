//! Cumulative data-provenance counters.
//!
//! Counts what the agent acquired and exported across runs so a user can see
//! how much of their data came from a live headset versus the synthetic
//! generator. Only counters are kept, never sample values.

use crate::acquisition::types::SourceMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// File name used under the data directory.
pub const TRANSPARENCY_FILE: &str = "transparency.json";

/// Plain snapshot of the provenance counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub sessions: u64,
    pub live_samples: u64,
    pub synthetic_samples: u64,
    /// Feature records handed to a sink
    pub records: u64,
    /// Sessions that ran synthetic after trying for a live stream
    pub fallbacks: u64,
}

impl Counters {
    pub fn samples(&self) -> u64 {
        self.live_samples + self.synthetic_samples
    }

    /// Fraction of samples that came from a live stream, if any were acquired.
    pub fn live_share(&self) -> Option<f64> {
        match self.samples() {
            0 => None,
            total => Some(self.live_samples as f64 / total as f64),
        }
    }
}

/// On-disk form of the log.
#[derive(Debug, Serialize, Deserialize)]
struct StoredLog {
    #[serde(flatten)]
    counters: Counters,
    #[serde(default = "Utc::now")]
    since: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Provenance counters shared by the session and the CLI.
#[derive(Debug)]
pub struct TransparencyLog {
    sessions: AtomicU64,
    live_samples: AtomicU64,
    synthetic_samples: AtomicU64,
    records: AtomicU64,
    fallbacks: AtomicU64,
    /// When counting started, carried over from the stored log
    since: DateTime<Utc>,
    store: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            sessions: AtomicU64::new(0),
            live_samples: AtomicU64::new(0),
            synthetic_samples: AtomicU64::new(0),
            records: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            since: Utc::now(),
            store: None,
        }
    }

    /// Open the log stored at `path`, resuming its counters if the file exists.
    ///
    /// An unreadable file is logged and counting starts from zero.
    pub fn open(path: PathBuf) -> Self {
        let mut log = Self::new();
        if path.exists() {
            if let Err(e) = log.load(&path) {
                tracing::warn!("Ignoring unreadable transparency log {path:?}: {e}");
            }
        }
        log.store = Some(path);
        log
    }

    pub fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Count `count` samples produced in `mode`.
    pub fn record_samples(&self, mode: SourceMode, count: u64) {
        let counter = match mode {
            SourceMode::Live => &self.live_samples,
            SourceMode::Synthetic => &self.synthetic_samples,
        };
        counter.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_exported(&self) {
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> Counters {
        Counters {
            sessions: self.sessions.load(Ordering::Relaxed),
            live_samples: self.live_samples.load(Ordering::Relaxed),
            synthetic_samples: self.synthetic_samples.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            counters: self.counters(),
            since: self.since,
        }
    }

    /// Human-readable provenance report.
    pub fn summary(&self) -> String {
        let counters = self.counters();
        let share = counters
            .live_share()
            .map(|s| format!("{:.1}% live", s * 100.0))
            .unwrap_or_else(|| "none acquired".to_string());

        format!(
            "Data provenance since {}:\n  \
             Sessions: {} ({} fell back to synthetic)\n  \
             Samples: {} live + {} synthetic ({})\n  \
             Feature records: {}",
            self.since.format("%Y-%m-%d %H:%M UTC"),
            counters.sessions,
            counters.fallbacks,
            counters.live_samples,
            counters.synthetic_samples,
            share,
            counters.records
        )
    }

    /// Write the counters to the backing file. A log without one is a no-op.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let Some(path) = &self.store else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let stored = StoredLog {
            counters: self.counters(),
            since: self.since,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&stored).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    fn load(&mut self, path: &Path) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        let stored: StoredLog = serde_json::from_str(&content).map_err(std::io::Error::other)?;
        self.restore(&stored.counters);
        self.since = stored.since;
        Ok(())
    }

    fn restore(&self, counters: &Counters) {
        self.sessions.store(counters.sessions, Ordering::Relaxed);
        self.live_samples
            .store(counters.live_samples, Ordering::Relaxed);
        self.synthetic_samples
            .store(counters.synthetic_samples, Ordering::Relaxed);
        self.records.store(counters.records, Ordering::Relaxed);
        self.fallbacks.store(counters.fallbacks, Ordering::Relaxed);
    }

    /// Zero every counter. The start time is kept.
    pub fn reset(&self) {
        self.restore(&Counters::default());
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters plus the time counting started.
#[derive(Debug, Clone, Serialize)]
pub struct TransparencyStats {
    #[serde(flatten)]
    pub counters: Counters,
    pub since: DateTime<Utc>,
}

pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Shared log resumed from and saved to `path`.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::open(path))
}

//! Configuration for the MindBalance agent.

use crate::core::bands::{BandError, BandTable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Directory name used under the platform config and data dirs.
const APP_DIR: &str = "mindbalance-agent";

/// Main configuration for an acquisition session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channels per sample
    pub channel_count: usize,

    /// Nominal sample rate in Hz
    pub sample_rate: u32,

    /// Session length in seconds
    pub duration_sec: f64,

    /// Window length in seconds; the whole session when unset
    pub window_sec: Option<f64>,

    /// How long a live pull may block
    #[serde(with = "duration_serde")]
    pub pull_timeout: Duration,

    /// How long to look for a live stream at session start
    #[serde(with = "duration_serde")]
    pub discovery_timeout: Duration,

    /// Whether to look for a live stream at all
    pub live: bool,

    /// Seed of the synthetic generator
    pub seed: u64,

    /// Frequency bands to aggregate
    pub bands: BandTable,

    /// Directory receiving raw and feature files
    pub export_path: PathBuf,

    /// Path for storing state and transparency logs
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            channel_count: 8,
            sample_rate: 256,
            duration_sec: 10.0,
            window_sec: None,
            pull_timeout: Duration::from_secs(1),
            discovery_timeout: Duration::from_secs(2),
            live: true,
            seed: 42,
            bands: BandTable::default(),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Window length in seconds, defaulting to the session length.
    pub fn window_sec(&self) -> f64 {
        self.window_sec.unwrap_or(self.duration_sec)
    }

    /// Session length as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_sec.max(0.0))
    }

    /// Samples per full window.
    pub fn window_capacity(&self) -> usize {
        (f64::from(self.sample_rate) * self.window_sec())
            .round()
            .max(1.0) as usize
    }

    /// Samples the session aims to acquire.
    pub fn sample_target(&self) -> usize {
        (f64::from(self.sample_rate) * self.duration_sec).round().max(0.0) as usize
    }

    /// PSD bin spacing a full window will be estimated at.
    pub fn resolution(&self) -> f64 {
        let segment = (2 * self.sample_rate as usize).min(self.window_capacity());
        f64::from(self.sample_rate) / segment as f64
    }

    /// Reject values no session can run with.
    ///
    /// Bands that receive no bin at the configured resolution are only
    /// logged, since a short best-effort window is still useful.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_count == 0 {
            return Err(ConfigError::Invalid(
                "channel_count must be positive".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "sample_rate must be positive".to_string(),
            ));
        }
        if !(self.duration_sec.is_finite() && self.duration_sec > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "duration_sec must be positive, got {}",
                self.duration_sec
            )));
        }
        if let Some(window) = self.window_sec {
            if !(window.is_finite() && window > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "window_sec must be positive, got {window}"
                )));
            }
        }
        self.bands.validate()?;

        let nyquist = f64::from(self.sample_rate) / 2.0;
        for band in self.bands.degenerate_bands(self.resolution(), nyquist) {
            tracing::warn!(
                "Band '{}' [{}, {}] Hz gets no bin at {} Hz / {:.3} Hz resolution",
                band.name,
                band.low_hz,
                band.high_hz,
                self.sample_rate,
                self.resolution()
            );
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<BandError> for ConfigError {
    fn from(e: BandError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

/// Serde support for Duration as fractional seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

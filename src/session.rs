//! The acquisition session driver.
//!
//! A [`Session`] pulls samples until the configured duration has elapsed or
//! the sample target `sample_rate × duration_sec` is reached, whichever comes
//! first. Every full window is estimated, aggregated, emitted and persisted
//! before the next sample is pulled. A short final window is processed too.

use crate::acquisition::fallback::Acquisition;
use crate::acquisition::live::StreamDiscovery;
use crate::acquisition::synthetic::seeded_rng;
use crate::acquisition::types::{Pull, SourceMode};
use crate::config::{Config, ConfigError};
use crate::core::bands::aggregate;
use crate::core::record::FeatureEmitter;
use crate::core::spectral::WelchEstimator;
use crate::core::windowing::{Window, WindowBuffer, WindowError};
use crate::export::{ExportError, RecordSink};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors that end a session.
///
/// An unavailable or failing live stream is not among them; it is absorbed
/// by the fallback to synthetic data.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("persistence failed: {0}")]
    Export(#[from] ExportError),
}

/// What a finished session did.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    /// Mode the session started producing samples in
    pub initial_mode: SourceMode,
    /// Mode at the end of the session
    pub mode: SourceMode,
    pub fallback_reason: Option<String>,
    pub samples: usize,
    pub live_samples: usize,
    pub synthetic_samples: usize,
    /// Pulls that returned nothing before their timeout
    pub timeouts: usize,
    pub windows: usize,
    pub records: usize,
    pub elapsed_secs: f64,
    /// Stopped early through the running flag
    pub cancelled: bool,
}

/// One acquisition run.
pub struct Session<'a> {
    config: Config,
    discovery: Option<&'a dyn StreamDiscovery>,
    running: Arc<AtomicBool>,
    transparency: SharedTransparencyLog,
}

impl<'a> Session<'a> {
    /// Create a session that runs synthetic unless a discovery is attached.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            discovery: None,
            running: Arc::new(AtomicBool::new(true)),
            transparency: create_shared_log(),
        }
    }

    /// Look for live streams through `discovery` when `config.live` is set.
    pub fn with_discovery(mut self, discovery: &'a dyn StreamDiscovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Share a cancellation flag; clearing it stops acquisition.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn with_transparency(mut self, transparency: SharedTransparencyLog) -> Self {
        self.transparency = transparency;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the session to completion, persisting into `sink`.
    pub fn run(&self, sink: &mut dyn RecordSink) -> Result<SessionReport, SessionError> {
        let config = &self.config;
        config.validate()?;

        let deadline = config.duration();
        let target = config.sample_target();

        let discovery = if config.live { self.discovery } else { None };
        let mut acquisition = Acquisition::open(
            config.channel_count,
            config.sample_rate,
            discovery,
            config.discovery_timeout,
            seeded_rng(config.seed),
        );
        // Discovery is not part of the session's duration.
        let start = Instant::now();

        let mut buffer = WindowBuffer::with_capacity(
            config.channel_count,
            config.sample_rate,
            config.window_capacity(),
        );
        let estimator = WelchEstimator::new(config.sample_rate);
        let mut emitter = FeatureEmitter::new();

        let mut report = SessionReport {
            session_id: emitter.session_id().to_string(),
            initial_mode: acquisition.mode(),
            mode: acquisition.mode(),
            fallback_reason: None,
            samples: 0,
            live_samples: 0,
            synthetic_samples: 0,
            timeouts: 0,
            windows: 0,
            records: 0,
            elapsed_secs: 0.0,
            cancelled: false,
        };
        self.transparency.record_session();
        let mut fell_back = acquisition.fallback_reason().is_some();
        if fell_back {
            self.transparency.record_fallback();
        }

        tracing::info!(
            "Session {} started: {} channels @ {} Hz for {} s ({} samples per window, {} mode)",
            report.session_id,
            config.channel_count,
            config.sample_rate,
            config.duration_sec,
            buffer.capacity(),
            acquisition.mode()
        );

        while start.elapsed() < deadline && report.samples < target {
            if !self.running.load(Ordering::SeqCst) {
                report.cancelled = true;
                break;
            }

            let pull = acquisition.next(config.pull_timeout);

            if !fell_back && acquisition.fallback_reason().is_some() {
                fell_back = true;
                self.transparency.record_fallback();
            }

            let sample = match pull {
                Pull::Sample(sample) => sample,
                Pull::Timeout => {
                    report.timeouts += 1;
                    tracing::debug!("No sample within {:?}", config.pull_timeout);
                    continue;
                }
            };

            report.samples += 1;
            match acquisition.mode() {
                SourceMode::Live => report.live_samples += 1,
                SourceMode::Synthetic => report.synthetic_samples += 1,
            }

            buffer.push(sample)?;
            if buffer.is_ready() {
                let window = buffer.drain();
                self.process(window, acquisition.mode(), &estimator, &mut emitter, sink)?;
                report.windows += 1;
            }
        }

        if !buffer.is_empty() {
            let window = buffer.drain();
            tracing::info!(
                "Processing final window {} with {} of {} samples",
                window.index,
                window.len(),
                window.capacity
            );
            self.process(window, acquisition.mode(), &estimator, &mut emitter, sink)?;
            report.windows += 1;
        }

        sink.finish()?;

        self.transparency
            .record_samples(SourceMode::Live, report.live_samples as u64);
        self.transparency
            .record_samples(SourceMode::Synthetic, report.synthetic_samples as u64);

        report.mode = acquisition.mode();
        report.fallback_reason = acquisition.fallback_reason().map(String::from);
        report.records = emitter.emitted();
        report.elapsed_secs = start.elapsed().as_secs_f64();

        tracing::info!(
            "Session {} finished: {} samples, {} windows in {:.2} s",
            report.session_id,
            report.samples,
            report.windows,
            report.elapsed_secs
        );

        Ok(report)
    }

    fn process(
        &self,
        window: Window,
        mode: SourceMode,
        estimator: &WelchEstimator,
        emitter: &mut FeatureEmitter,
        sink: &mut dyn RecordSink,
    ) -> Result<(), SessionError> {
        sink.persist_samples(&window)?;

        let psd = estimator.estimate(&window);
        let powers = aggregate(&psd, &self.config.bands);
        let timestamp = window.start_timestamp().unwrap_or(0.0);
        let record = emitter.emit(powers, timestamp, &window, mode);

        tracing::debug!(
            "Window {}: {} bins, {} segments of {} samples",
            window.index,
            psd.frequencies.len(),
            psd.segments,
            psd.segment_len
        );

        sink.persist_record(&record)?;
        self.transparency.record_exported();

        tracing::info!(
            "Window {} complete ({} samples, {})",
            window.index,
            window.len(),
            mode
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::live::testing::{ramp, ScriptedDiscovery, Step};
    use crate::export::MemorySink;

    fn config(channels: usize, rate: u32, duration: f64) -> Config {
        Config {
            channel_count: channels,
            sample_rate: rate,
            duration_sec: duration,
            discovery_timeout: std::time::Duration::from_millis(10),
            pull_timeout: std::time::Duration::from_millis(200),
            ..Config::default()
        }
    }

    #[test]
    fn test_synthetic_session_counts() {
        let mut sink = MemorySink::new();
        let report = Session::new(config(8, 256, 5.0)).run(&mut sink).unwrap();

        assert_eq!(report.mode, SourceMode::Synthetic);
        assert_eq!(report.samples, 1280);
        assert_eq!(report.windows, 1);
        assert_eq!(report.records, 1);
        assert!(report.fallback_reason.is_some());
        assert_eq!(sink.samples.len(), 1280);
        assert!(sink.finished);
    }

    #[test]
    fn test_multiple_windows() {
        let config = Config {
            window_sec: Some(0.5),
            ..config(2, 64, 2.0)
        };
        let mut sink = MemorySink::new();
        let report = Session::new(config).run(&mut sink).unwrap();

        assert_eq!(report.windows, 4);
        let indices: Vec<usize> = sink.records.iter().map(|r| r.window_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(sink.records.iter().all(|r| r.sample_count == 32));
    }

    #[test]
    fn test_cancelled_before_start() {
        let running = Arc::new(AtomicBool::new(false));
        let mut sink = MemorySink::new();
        let report = Session::new(config(2, 64, 1.0))
            .with_running_flag(running)
            .run(&mut sink)
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.samples, 0);
        assert!(sink.records.is_empty());
        assert!(sink.finished);
    }

    #[test]
    fn test_live_session_falls_back_once() {
        let mut steps = ramp(2, 10);
        steps.push(Step::Fail);
        let discovery = ScriptedDiscovery::new(2, steps);
        let log = create_shared_log();

        let mut sink = MemorySink::new();
        let report = Session::new(config(2, 64, 1.0))
            .with_discovery(&discovery)
            .with_transparency(log.clone())
            .run(&mut sink)
            .unwrap();

        assert_eq!(report.initial_mode, SourceMode::Live);
        assert_eq!(report.mode, SourceMode::Synthetic);
        assert_eq!(report.live_samples, 10);
        assert_eq!(report.synthetic_samples, 54);
        let counters = log.counters();
        assert_eq!(counters.sessions, 1);
        assert_eq!(counters.fallbacks, 1);
        assert_eq!(counters.live_samples, 10);
        assert_eq!(counters.records, 1);
        assert_eq!(sink.samples[9].values, vec![9.0, 9.0]);
    }

    #[test]
    fn test_live_disabled_ignores_discovery() {
        let discovery = ScriptedDiscovery::new(2, ramp(2, 100));
        let config = Config {
            live: false,
            ..config(2, 32, 1.0)
        };
        let mut sink = MemorySink::new();
        let report = Session::new(config)
            .with_discovery(&discovery)
            .run(&mut sink)
            .unwrap();

        assert_eq!(report.initial_mode, SourceMode::Synthetic);
        assert_eq!(report.live_samples, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut sink = MemorySink::new();
        let result = Session::new(config(0, 256, 1.0)).run(&mut sink);
        assert!(matches!(result, Err(SessionError::Config(_))));
    }
}

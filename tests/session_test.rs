//! End-to-end session tests.

use mindbalance_agent::acquisition::{
    StreamDescriptor, StreamDiscovery, StreamInlet, EEG_STREAM_TYPE,
};
use mindbalance_agent::export::{ExportError, FEATURES_CSV, FEATURES_JSON, RAW_CSV};
use mindbalance_agent::{
    Config, FeatureRecord, FileSink, MemorySink, RecordSink, Sample, Session, SessionError,
    SourceError, SourceMode, WelchEstimator, Window, WindowBuffer,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

fn config(channels: usize, rate: u32, duration: f64) -> Config {
    Config {
        channel_count: channels,
        sample_rate: rate,
        duration_sec: duration,
        live: true,
        discovery_timeout: Duration::from_millis(10),
        pull_timeout: Duration::from_millis(200),
        ..Config::default()
    }
}

/// Discovery that finds nothing.
struct NoStreams;

impl StreamDiscovery for NoStreams {
    fn resolve(&self, _: &str, _: Duration) -> Result<Vec<StreamDescriptor>, SourceError> {
        Ok(Vec::new())
    }

    fn open(&self, _: &StreamDescriptor) -> Result<Box<dyn StreamInlet>, SourceError> {
        Err(SourceError::NoStreams(EEG_STREAM_TYPE.to_string()))
    }
}

/// Discovery that waits out its whole timeout and finds nothing.
struct QuietNetwork;

impl StreamDiscovery for QuietNetwork {
    fn resolve(&self, _: &str, timeout: Duration) -> Result<Vec<StreamDescriptor>, SourceError> {
        thread::sleep(timeout);
        Ok(Vec::new())
    }

    fn open(&self, _: &StreamDescriptor) -> Result<Box<dyn StreamInlet>, SourceError> {
        Err(SourceError::NoStreams(EEG_STREAM_TYPE.to_string()))
    }
}

/// Inlet replaying fixed samples, then failing or idling.
struct ReplayInlet {
    samples: VecDeque<Sample>,
    fail_when_empty: bool,
}

impl StreamInlet for ReplayInlet {
    fn pull_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        match self.samples.pop_front() {
            Some(sample) => Ok(Some(sample)),
            None if self.fail_when_empty => Err(SourceError::Disconnected),
            None => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

struct ReplayDiscovery {
    descriptor: StreamDescriptor,
    inlet: Mutex<Option<ReplayInlet>>,
}

impl ReplayDiscovery {
    fn new(advertised: usize, samples: Vec<Sample>, fail_when_empty: bool) -> Self {
        Self {
            descriptor: descriptor(advertised, "memory".to_string()),
            inlet: Mutex::new(Some(ReplayInlet {
                samples: samples.into(),
                fail_when_empty,
            })),
        }
    }
}

impl StreamDiscovery for ReplayDiscovery {
    fn resolve(&self, _: &str, _: Duration) -> Result<Vec<StreamDescriptor>, SourceError> {
        Ok(vec![self.descriptor.clone()])
    }

    fn open(&self, _: &StreamDescriptor) -> Result<Box<dyn StreamInlet>, SourceError> {
        let inlet = self.inlet.lock().unwrap().take();
        inlet
            .map(|i| Box::new(i) as Box<dyn StreamInlet>)
            .ok_or(SourceError::Disconnected)
    }
}

/// Sink whose feature writes always fail.
struct BrokenSink;

impl RecordSink for BrokenSink {
    fn persist_samples(&mut self, _: &Window) -> Result<(), ExportError> {
        Ok(())
    }

    fn persist_record(&mut self, _: &FeatureRecord) -> Result<(), ExportError> {
        Err(ExportError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only volume",
        )))
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        Ok(())
    }
}

fn descriptor(channel_count: usize, endpoint: String) -> StreamDescriptor {
    StreamDescriptor {
        name: "TestCap".to_string(),
        stream_type: EEG_STREAM_TYPE.to_string(),
        channel_count,
        nominal_srate: 64.0,
        source_id: "test-cap".to_string(),
        endpoint,
    }
}

fn ramp(channels: usize, n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| Sample::new(vec![i as f64; channels], i as f64 / 64.0))
        .collect()
}

#[test]
fn test_synthetic_session_writes_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(8, 256, 5.0);
    let mut sink = FileSink::create(dir.path(), 8, &config.bands).unwrap();

    let report = Session::new(config)
        .with_discovery(&NoStreams)
        .run(&mut sink)
        .unwrap();

    assert_eq!(report.mode, SourceMode::Synthetic);
    assert_eq!(
        report.fallback_reason.as_deref(),
        Some("no EEG stream found")
    );
    assert_eq!(report.samples, 1280);
    assert_eq!(report.records, 1);

    let raw = std::fs::read_to_string(dir.path().join(RAW_CSV)).unwrap();
    let mut lines = raw.lines();
    assert_eq!(
        lines.next(),
        Some("ch1,ch2,ch3,ch4,ch5,ch6,ch7,ch8,timestamp")
    );
    assert_eq!(lines.count(), 1280);

    let features = std::fs::read_to_string(dir.path().join(FEATURES_CSV)).unwrap();
    assert_eq!(features.lines().count(), 1 + 8);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(FEATURES_JSON)).unwrap())
            .unwrap();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 8);
    for row in rows {
        for band in ["theta", "alpha", "beta"] {
            assert!(row[band].as_f64().unwrap() > 0.0);
        }
    }
}

#[test]
fn test_short_session_best_effort() {
    let mut sink = MemorySink::new();
    let report = Session::new(config(2, 4, 2.0)).run(&mut sink).unwrap();

    assert_eq!(report.samples, 8);
    assert_eq!(sink.records.len(), 1);
    // Bins stop at the 2 Hz Nyquist, so every band is empty.
    assert!(sink.records[0].channels[0].bands.get("alpha").unwrap().is_nan());

    let mut buffer = WindowBuffer::with_capacity(2, 4, 8);
    for sample in sink.samples.iter().cloned() {
        buffer.push(sample).unwrap();
    }
    let psd = WelchEstimator::new(4).estimate(&buffer.drain());
    assert!(!psd.is_empty());
}

#[test]
fn test_fixed_seed_is_reproducible() {
    let run = || {
        let mut sink = MemorySink::new();
        Session::new(Config {
            live: false,
            seed: 7,
            ..config(4, 128, 2.0)
        })
        .run(&mut sink)
        .unwrap();
        sink
    };

    let a = run();
    let b = run();
    assert_eq!(a.samples.len(), b.samples.len());
    for (x, y) in a.samples.iter().zip(&b.samples) {
        assert_eq!(x.values, y.values);
    }
    assert_eq!(a.rows().len(), b.rows().len());
    for (x, y) in a.rows().iter().zip(b.rows().iter()) {
        assert_eq!(x.bands, y.bands);
    }
}

#[test]
fn test_live_session_without_fallback() {
    let discovery = ReplayDiscovery::new(2, ramp(2, 64), false);
    let mut sink = MemorySink::new();

    let report = Session::new(config(2, 64, 1.0))
        .with_discovery(&discovery)
        .run(&mut sink)
        .unwrap();

    assert_eq!(report.mode, SourceMode::Live);
    assert!(report.fallback_reason.is_none());
    assert_eq!(report.live_samples, 64);
    assert_eq!(sink.records[0].mode, SourceMode::Live);
    assert_eq!(sink.samples[63].values, vec![63.0, 63.0]);
}

#[test]
fn test_mid_session_failure_falls_back_once() {
    let discovery = ReplayDiscovery::new(2, ramp(2, 20), true);
    let mut sink = MemorySink::new();

    let report = Session::new(config(2, 64, 1.0))
        .with_discovery(&discovery)
        .run(&mut sink)
        .unwrap();

    assert_eq!(report.initial_mode, SourceMode::Live);
    assert_eq!(report.mode, SourceMode::Synthetic);
    assert_eq!(report.live_samples, 20);
    assert_eq!(report.synthetic_samples, 44);
    assert_eq!(sink.samples.len(), 64);
    assert!(report.fallback_reason.unwrap().contains("disconnected"));
}

#[test]
fn test_channel_mismatch_runs_synthetic() {
    let discovery = ReplayDiscovery::new(4, ramp(4, 64), false);
    let mut sink = MemorySink::new();

    let report = Session::new(config(8, 64, 1.0))
        .with_discovery(&discovery)
        .run(&mut sink)
        .unwrap();

    assert_eq!(report.initial_mode, SourceMode::Synthetic);
    assert_eq!(report.live_samples, 0);
    assert!(sink.samples.iter().all(|s| s.channel_count() == 8));
}

#[test]
fn test_persistence_failure_propagates() {
    let result = Session::new(config(2, 32, 1.0)).run(&mut BrokenSink);
    assert!(matches!(
        result,
        Err(SessionError::Export(ExportError::Io(_)))
    ));
}

#[test]
fn test_discovery_time_not_counted_against_duration() {
    let config = Config {
        channel_count: 2,
        sample_rate: 4,
        duration_sec: 2.0,
        ..Config::default()
    };
    assert_eq!(config.discovery_timeout, Duration::from_secs(2));

    let mut sink = MemorySink::new();
    let started = Instant::now();
    let report = Session::new(config)
        .with_discovery(&QuietNetwork)
        .run(&mut sink)
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(report.initial_mode, SourceMode::Synthetic);
    assert_eq!(report.samples, 8);
    assert_eq!(report.windows, 1);
    assert_eq!(report.records, 1);
    assert_eq!(
        report.fallback_reason.as_deref(),
        Some("no EEG stream found")
    );
}

#[test]
fn test_silent_stream_falls_back() {
    let discovery = ReplayDiscovery::new(2, Vec::new(), false);
    let mut sink = MemorySink::new();

    let report = Session::new(config(2, 64, 1.0))
        .with_discovery(&discovery)
        .run(&mut sink)
        .unwrap();

    assert_eq!(report.initial_mode, SourceMode::Live);
    assert_eq!(report.mode, SourceMode::Synthetic);
    assert_eq!(report.live_samples, 0);
    assert_eq!(report.synthetic_samples, 64);
    assert_eq!(report.records, 1);
    assert_eq!(sink.records[0].mode, SourceMode::Synthetic);
    assert!(report
        .fallback_reason
        .unwrap()
        .starts_with("no samples within"));
}

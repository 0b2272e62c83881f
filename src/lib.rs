//! MindBalance Agent - EEG band-power features for neurofeedback.
//!
//! This library acquires multi-channel EEG samples, either from a live
//! stream or from a seeded synthetic generator, cuts them into fixed-size
//! windows and turns every window into per-channel theta, alpha and beta
//! band powers.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       MindBalance Agent                       │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐          │
//! │  │ Acquisition │──▶│  Windowing  │──▶│   Welch     │          │
//! │  │(live/synth) │   │ (N samples) │   │    PSD      │          │
//! │  └─────────────┘   └─────────────┘   └─────────────┘          │
//! │         │                                    │                │
//! │         ▼                                    ▼                │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐          │
//! │  │Transparency │   │   Export    │◀──│ Band power  │          │
//! │  │    Log      │   │ (CSV, JSON) │   │  + record   │          │
//! │  └─────────────┘   └─────────────┘   └─────────────┘          │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use mindbalance_agent::{export::FileSink, Config, Session};
//!
//! let config = Config {
//!     duration_sec: 5.0,
//!     live: false,
//!     ..Config::default()
//! };
//! let mut sink = FileSink::create("out", config.channel_count, &config.bands)
//!     .expect("Failed to open output files");
//! let report = Session::new(config).run(&mut sink).expect("Session failed");
//! println!("{} windows in {} mode", report.windows, report.mode);
//! ```

pub mod acquisition;
pub mod config;
pub mod core;
pub mod export;
pub mod session;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use acquisition::{Acquisition, Pull, Sample, SampleSource, SourceError, SourceMode};
pub use config::{Config, ConfigError};
pub use core::{
    aggregate, BandPower, BandTable, FeatureEmitter, FeatureRecord, Psd, WelchEstimator, Window,
    WindowBuffer,
};
pub use export::{ExportError, FileSink, MemorySink, RecordSink};
pub use session::{Session, SessionError, SessionReport};
pub use transparency::{Counters, SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

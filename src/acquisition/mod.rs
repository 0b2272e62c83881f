//! Sample acquisition for the MindBalance agent.
//!
//! A session draws samples either from a live EEG stream or from a seeded
//! synthetic generator. [`Acquisition`] owns the choice between the two and
//! the one-time fallback from live to synthetic.

pub mod fallback;
pub mod live;
#[cfg(feature = "lsl")]
pub mod lsl;
pub mod synthetic;
pub mod types;

// Re-export commonly used types
pub use fallback::{Acquisition, Phase};
pub use live::{
    connect, Connection, LiveSource, StreamDescriptor, StreamDiscovery, StreamInlet,
    EEG_STREAM_TYPE,
};
#[cfg(feature = "lsl")]
pub use lsl::{LslDiscovery, LslInlet};
pub use synthetic::{seeded_rng, unix_now, SyntheticSource, SYNTHETIC_SEED};
pub use types::{Pull, Sample, SampleSource, SourceError, SourceMode};

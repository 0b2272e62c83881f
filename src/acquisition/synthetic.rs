//! Deterministic synthetic EEG generator.
//!
//! Used when no live stream is available. Channel values are independent
//! unit-normal draws from a session-owned, explicitly seeded generator, so two
//! sessions with the same configuration produce identical values.
//!
//! Timestamps are paced as `anchor + i / sample_rate`. The pacing is cosmetic:
//! the generator never sleeps, so a synthetic session fills its window as fast
//! as the pipeline can pull. A live stream, by contrast, is rate-limited by the
//! upstream device.

use crate::acquisition::types::{Pull, Sample, SampleSource, SourceError, SourceMode};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::Normal;
use std::time::Duration;

/// Seed used when the configuration does not override it.
pub const SYNTHETIC_SEED: u64 = 42;

/// Build the session generator for `seed`.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Current wall-clock time as fractional Unix seconds.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Seeded unit-normal sample generator.
pub struct SyntheticSource {
    channel_count: usize,
    sample_rate: u32,
    rng: StdRng,
    normal: Normal,
    anchor: f64,
    index: u64,
}

impl SyntheticSource {
    /// Create a generator anchored at the current wall-clock time.
    pub fn new(channel_count: usize, sample_rate: u32, rng: StdRng) -> Self {
        Self::with_anchor(channel_count, sample_rate, rng, unix_now())
    }

    /// Create a generator whose first timestamp is `anchor`.
    pub fn with_anchor(channel_count: usize, sample_rate: u32, rng: StdRng, anchor: f64) -> Self {
        Self {
            channel_count,
            sample_rate,
            rng,
            normal: Normal::standard(),
            anchor,
            index: 0,
        }
    }

    /// Number of samples generated so far.
    pub fn generated(&self) -> u64 {
        self.index
    }

    /// Produce the next sample. Never blocks.
    pub fn next_sample(&mut self) -> Sample {
        use rand::distributions::Distribution;

        let values = (0..self.channel_count)
            .map(|_| self.normal.sample(&mut self.rng))
            .collect();
        let timestamp = self.anchor + self.index as f64 / f64::from(self.sample_rate);
        self.index += 1;

        Sample::new(values, timestamp)
    }
}

impl SampleSource for SyntheticSource {
    fn mode(&self) -> SourceMode {
        SourceMode::Synthetic
    }

    fn next(&mut self, _timeout: Duration) -> Result<Pull, SourceError> {
        Ok(Pull::Sample(self.next_sample()))
    }
}

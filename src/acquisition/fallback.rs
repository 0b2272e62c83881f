//! Session-level source selection.
//!
//! An [`Acquisition`] starts in `Discovering`, tries once to connect to a live
//! EEG stream and settles in either `Live` or `Synthetic`. A transport error
//! while live, or a stream that stays silent past the first pull timeout,
//! moves it to `Synthetic` for the rest of the session. `Synthetic` is
//! terminal, so the fallback happens at most once.

use crate::acquisition::live::{connect, Connection, LiveSource, StreamDiscovery};
use crate::acquisition::synthetic::{seeded_rng, SyntheticSource, SYNTHETIC_SEED};
use crate::acquisition::types::{Pull, SampleSource, SourceMode};
use rand::rngs::StdRng;
use std::time::Duration;

/// Observable phase of the source state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovering,
    Live,
    Synthetic,
}

enum State {
    Discovering,
    Live(LiveSource),
    Synthetic(SyntheticSource),
}

/// Sample source that owns the live-to-synthetic fallback.
pub struct Acquisition {
    state: State,
    channel_count: usize,
    sample_rate: u32,
    rng: Option<StdRng>,
    fallback_reason: Option<String>,
    /// A live sample has been delivered
    streaming: bool,
}

impl Acquisition {
    /// Resolve the source for a session.
    ///
    /// With `discovery` set to `None` live acquisition is skipped and the
    /// session starts synthetic straight away. `rng` seeds the synthetic
    /// generator if and when it is needed.
    pub fn open(
        channel_count: usize,
        sample_rate: u32,
        discovery: Option<&dyn StreamDiscovery>,
        discovery_timeout: Duration,
        rng: StdRng,
    ) -> Self {
        let mut acquisition = Self {
            state: State::Discovering,
            channel_count,
            sample_rate,
            rng: Some(rng),
            fallback_reason: None,
            streaming: false,
        };

        let connection = match discovery {
            Some(discovery) => connect(discovery, channel_count, discovery_timeout),
            None => Connection::Unavailable("live acquisition disabled".to_string()),
        };

        match connection {
            Connection::Connected { descriptor, inlet } => {
                tracing::info!("Connected! Streaming data...");
                acquisition.state = State::Live(LiveSource::spawn(descriptor, inlet));
            }
            Connection::Unavailable(reason) => acquisition.fall_back(reason),
        }

        acquisition
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Discovering => Phase::Discovering,
            State::Live(_) => Phase::Live,
            State::Synthetic(_) => Phase::Synthetic,
        }
    }

    /// Mode of the samples currently being produced.
    ///
    /// `Discovering` never outlives [`Acquisition::open`], so it is reported
    /// as synthetic.
    pub fn mode(&self) -> SourceMode {
        match self.state {
            State::Live(_) => SourceMode::Live,
            State::Discovering | State::Synthetic(_) => SourceMode::Synthetic,
        }
    }

    /// Why the session is running synthetic, if it is.
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Pull the next sample.
    ///
    /// Live errors are absorbed here: the cause is logged, the session
    /// switches to the synthetic generator and the pull is retried there.
    /// A live stream that times out before delivering its first sample is
    /// treated the same way. Later timeouts are gaps and return
    /// [`Pull::Timeout`].
    pub fn next(&mut self, timeout: Duration) -> Pull {
        let live = matches!(self.state, State::Live(_));
        let source: &mut dyn SampleSource = match &mut self.state {
            State::Live(source) => source,
            State::Synthetic(source) => source,
            State::Discovering => return Pull::Timeout,
        };

        match source.next(timeout) {
            Ok(Pull::Timeout) if live && !self.streaming => {
                self.fall_back(format!("no samples within {timeout:?}"));
                self.next(timeout)
            }
            Ok(pull) => {
                if live && matches!(pull, Pull::Sample(_)) {
                    self.streaming = true;
                }
                pull
            }
            Err(e) if live => {
                self.fall_back(e.to_string());
                self.next(timeout)
            }
            Err(e) => {
                tracing::error!("Synthetic source failed: {e}");
                Pull::Timeout
            }
        }
    }

    fn fall_back(&mut self, reason: String) {
        match &self.state {
            State::Live(source) => tracing::warn!(
                "Lost live stream '{}' ({}), simulating data...",
                source.descriptor().name,
                reason
            ),
            _ => tracing::warn!("No live stream found, simulating data... ({reason})"),
        }

        let rng = self
            .rng
            .take()
            .unwrap_or_else(|| seeded_rng(SYNTHETIC_SEED));
        // Replacing a live state drops the LiveSource, which stops its reader.
        self.state = State::Synthetic(SyntheticSource::new(
            self.channel_count,
            self.sample_rate,
            rng,
        ));
        self.fallback_reason = Some(reason);
    }
}

//! Live stream acquisition.
//!
//! The upstream collaborator is abstracted behind two traits:
//! [`StreamDiscovery`] finds EEG-typed streams and opens them, and
//! [`StreamInlet`] pulls one timestamped sample at a time. Pulls run on a
//! reader thread that feeds a bounded channel, so the session loop only ever
//! waits on `recv_timeout`.

use crate::acquisition::types::{Pull, Sample, SampleSource, SourceError, SourceMode};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Stream type requested during discovery.
pub const EEG_STREAM_TYPE: &str = "EEG";

/// How long the reader thread waits on a single inlet pull before
/// re-checking its stop flag.
const READER_POLL: Duration = Duration::from_millis(100);

/// Samples buffered between the reader thread and the session loop.
const CHANNEL_CAPACITY: usize = 10_000;

/// Metadata of a discovered stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    pub stream_type: String,
    pub channel_count: usize,
    /// Nominal sample rate in Hz, 0 for irregular streams
    pub nominal_srate: f64,
    pub source_id: String,
    /// Adapter-specific address used to open the stream
    pub endpoint: String,
}

/// Pulls samples from one opened stream.
pub trait StreamInlet: Send {
    /// Wait up to `timeout` for a sample. `Ok(None)` means nothing arrived.
    fn pull_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError>;
}

/// Finds and opens upstream streams.
pub trait StreamDiscovery {
    /// List streams of `stream_type`, waiting at most `timeout`.
    fn resolve(
        &self,
        stream_type: &str,
        timeout: Duration,
    ) -> Result<Vec<StreamDescriptor>, SourceError>;

    /// Open an inlet on a previously resolved stream.
    fn open(&self, descriptor: &StreamDescriptor) -> Result<Box<dyn StreamInlet>, SourceError>;
}

/// Result of the one-time connection attempt at session start.
pub enum Connection {
    Connected {
        descriptor: StreamDescriptor,
        inlet: Box<dyn StreamInlet>,
    },
    Unavailable(String),
}

impl Connection {
    pub fn is_connected(&self) -> bool {
        matches!(self, Connection::Connected { .. })
    }
}

/// Discover an EEG stream and open the first match.
///
/// Every failure (nothing found, wrong channel count, open error) is folded
/// into [`Connection::Unavailable`] with a human-readable reason.
pub fn connect(
    discovery: &dyn StreamDiscovery,
    channel_count: usize,
    timeout: Duration,
) -> Connection {
    tracing::info!("Searching for {} stream...", EEG_STREAM_TYPE);

    let streams = match discovery.resolve(EEG_STREAM_TYPE, timeout) {
        Ok(streams) => streams,
        Err(e) => return Connection::Unavailable(e.to_string()),
    };

    let Some(descriptor) = streams.into_iter().next() else {
        return Connection::Unavailable(
            SourceError::NoStreams(EEG_STREAM_TYPE.to_string()).to_string(),
        );
    };

    if descriptor.channel_count != channel_count {
        return Connection::Unavailable(
            SourceError::ChannelMismatch {
                expected: channel_count,
                actual: descriptor.channel_count,
            }
            .to_string(),
        );
    }

    match discovery.open(&descriptor) {
        Ok(inlet) => {
            tracing::info!(
                "Connected to '{}' ({} channels @ {} Hz)",
                descriptor.name,
                descriptor.channel_count,
                descriptor.nominal_srate
            );
            Connection::Connected { descriptor, inlet }
        }
        Err(e) => Connection::Unavailable(e.to_string()),
    }
}

/// Sample source backed by an opened inlet and a reader thread.
pub struct LiveSource {
    descriptor: StreamDescriptor,
    receiver: Receiver<Result<Sample, SourceError>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl LiveSource {
    /// Start pulling from `inlet` on a background thread.
    pub fn spawn(descriptor: StreamDescriptor, mut inlet: Box<dyn StreamInlet>) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let width = descriptor.channel_count;

        let handle = thread::spawn(move || {
            while flag.load(Ordering::SeqCst) {
                match inlet.pull_sample(READER_POLL) {
                    Ok(Some(sample)) if sample.channel_count() != width => {
                        let _ = sender.send(Err(SourceError::ChannelMismatch {
                            expected: width,
                            actual: sample.channel_count(),
                        }));
                        break;
                    }
                    Ok(Some(sample)) => {
                        if sender.send(Ok(sample)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        let _ = sender.send(Err(e));
                        break;
                    }
                }
            }
            flag.store(false, Ordering::SeqCst);
        });

        Self {
            descriptor,
            receiver,
            running,
            thread_handle: Some(handle),
        }
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    /// Stop the reader thread and discard anything still queued.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Unblock a reader stuck on a full channel.
        while self.receiver.try_recv().is_ok() {}
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl SampleSource for LiveSource {
    fn mode(&self) -> SourceMode {
        SourceMode::Live
    }

    fn next(&mut self, timeout: Duration) -> Result<Pull, SourceError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(sample)) => Ok(Pull::Sample(sample)),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(Pull::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Disconnected),
        }
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        self.stop();
    }
}

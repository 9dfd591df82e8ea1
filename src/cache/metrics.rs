//! Metrics Sink Module
//!
//! Optional observer that receives every cache event. A misbehaving sink
//! can never change what the cache stores or returns.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

use crate::cache::NamespaceStats;

/// Error a sink may report; it is logged and otherwise ignored.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

// == Event Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Hit,
    Miss,
    Eviction,
    Expiration,
    StampedeAvoided,
}

// == Metric Event ==
/// One observation delivered to a [`MetricsSink`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricEvent {
    pub kind: EventKind,
    pub namespace: Arc<str>,
    /// Wall-clock time of the event
    pub timestamp: DateTime<Utc>,
}

// == Metrics Sink ==
/// Receives cache events.
///
/// Called synchronously while the namespace is locked. A sink that blocks
/// stalls every operation on that namespace, including fetch commits, so
/// implementations must hand the event off without waiting. [`ChannelSink`]
/// does this for sinks that need to do real work.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &MetricEvent) -> Result<(), SinkError>;
}

/// Sink that writes each event as a `trace` level log record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, event: &MetricEvent) -> Result<(), SinkError> {
        trace!(
            kind = ?event.kind,
            namespace = %event.namespace,
            timestamp = %event.timestamp,
            "cache event"
        );
        Ok(())
    }
}

/// Sink that forwards events over a bounded channel to a consumer task.
///
/// Never blocks: when the channel is full or the receiver is gone the event
/// is dropped and reported as an error, which the cache logs.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use mini_cache::cache::ChannelSink;
/// use mini_cache::{CacheConfig, CacheManager};
///
/// let (sink, mut events) = ChannelSink::new(1024);
/// let cache: CacheManager<String, u64> = CacheManager::builder(CacheConfig::default())
///     .metrics_sink(Arc::new(sink))
///     .build()
///     .unwrap();
///
/// cache.get("users", "missing");
/// assert!(events.try_recv().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<MetricEvent>,
}

impl ChannelSink {
    /// Creates a sink holding at most `capacity` undelivered events.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MetricEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl MetricsSink for ChannelSink {
    fn record(&self, event: &MetricEvent) -> Result<(), SinkError> {
        self.sender.try_send(event.clone()).map_err(|err| match err {
            TrySendError::Full(_) => "metrics channel full, event dropped".into(),
            TrySendError::Closed(_) => "metrics receiver closed, event dropped".into(),
        })
    }
}

// == Recorder ==
/// Feeds one namespace's counters and forwards events to the sink.
#[derive(Clone)]
pub(crate) struct Recorder {
    namespace: Arc<str>,
    stats: Arc<NamespaceStats>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl Recorder {
    pub(crate) fn new(
        namespace: Arc<str>,
        stats: Arc<NamespaceStats>,
        sink: Option<Arc<dyn MetricsSink>>,
    ) -> Self {
        Self {
            namespace,
            stats,
            sink,
        }
    }

    pub(crate) fn record(&self, kind: EventKind) {
        self.stats.record(kind);

        let Some(sink) = &self.sink else {
            return;
        };
        let event = MetricEvent {
            kind,
            namespace: self.namespace.clone(),
            timestamp: Utc::now(),
        };
        match panic::catch_unwind(AssertUnwindSafe(|| sink.record(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(namespace = %self.namespace, error = %err, "metrics sink rejected event")
            }
            Err(_) => warn!(namespace = %self.namespace, "metrics sink panicked"),
        }
    }

    pub(crate) fn stats(&self) -> &Arc<NamespaceStats> {
        &self.stats
    }

    pub(crate) fn namespace(&self) -> &Arc<str> {
        &self.namespace
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("namespace", &self.namespace)
            .field("stats", &self.stats)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

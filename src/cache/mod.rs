//! Cache Module
//!
//! Provides namespaced in-memory caching with LRU eviction, TTL expiration,
//! stale-while-revalidate and deduplicated read-through fetches.

mod clock;
mod entry;
mod flight;
mod key;
mod lru;
mod manager;
pub(crate) mod metrics;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use entry::{Entry, Freshness, MAX_TTL};
pub use flight::{Flight, FlightResult, Singleflight};
pub use key::CacheKey;
pub use lru::EvictionIndex;
pub use manager::{CacheManager, CacheManagerBuilder, FetchOptions, SetOptions};
pub use metrics::{ChannelSink, EventKind, MetricEvent, MetricsSink, SinkError, TracingSink};
pub use stats::{NamespaceSnapshot, NamespaceStats, StatsSnapshot};
pub use store::{CacheResult, NamespaceStore, WriteToken};

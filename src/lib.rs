//! Mini Cache - An embeddable namespaced cache
//!
//! Provides LRU eviction, TTL expiration, stale-while-revalidate and
//! singleflight read-through fetches behind one [`CacheManager`].

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{
    CacheKey, CacheManager, CacheResult, ChannelSink, Clock, EventKind, FetchOptions, ManualClock,
    MetricEvent, MetricsSink, SetOptions, SinkError, StatsSnapshot, SystemClock, TracingSink,
};
pub use config::{CacheConfig, NamespaceConfig};
pub use error::{ConfigError, FetchError};
pub use tasks::spawn_sweep_task;

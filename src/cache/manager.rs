//! Cache Manager Module
//!
//! Top-level façade: routes operations to namespace stores, composes the
//! read-through path out of store lookups, singleflight and
//! stale-while-revalidate, and owns the background sweepers.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::metrics::Recorder;
use crate::cache::{
    CacheResult, Clock, EventKind, Flight, MetricsSink, NamespaceSnapshot, NamespaceStats,
    NamespaceStore, Singleflight, StatsSnapshot, SystemClock, WriteToken,
};
use crate::config::{CacheConfig, NamespaceConfig};
use crate::error::{ConfigError, FetchError};
use crate::tasks::spawn_sweep_task;

// == Options ==
/// Per-call options for [`CacheManager::set_with_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Overrides the namespace TTL for this entry
    pub ttl: Option<Duration>,
}

impl SetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// Per-call options for [`CacheManager::get_or_fetch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Overrides the namespace TTL for the fetched value
    pub ttl: Option<Duration>,
    /// Longest this caller waits for a fetch; the fetch itself keeps running
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// == Namespace ==
/// A live namespace: its locked store plus a lock-free handle on its counters.
struct Namespace<K, V> {
    name: Arc<str>,
    store: Arc<Mutex<NamespaceStore<K, V>>>,
    recorder: Recorder,
    sweep_interval: Option<Duration>,
}

// == Builder ==
/// Builder for [`CacheManager`].
pub struct CacheManagerBuilder<K, V, E> {
    config: CacheConfig,
    clock: Option<Arc<dyn Clock>>,
    sink: Option<Arc<dyn MetricsSink>>,
    _marker: PhantomData<fn() -> (K, V, E)>,
}

impl<K, V, E> CacheManagerBuilder<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Replaces the system clock, typically with a [`crate::cache::ManualClock`] in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validates the configuration and creates every configured namespace.
    pub fn build(self) -> Result<CacheManager<K, V, E>, ConfigError> {
        self.config.validate()?;

        let manager = CacheManager {
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            sink: self.sink,
            namespaces: RwLock::new(HashMap::new()),
            flights: Singleflight::new(),
            sweepers: Mutex::new(HashMap::new()),
            maintenance: AtomicBool::new(false),
            emergency_clears: AtomicU64::new(0),
            config: self.config,
        };

        {
            let mut namespaces = manager.namespaces.write();
            for (name, config) in &manager.config.namespaces {
                let name: Arc<str> = Arc::from(name.as_str());
                let namespace = manager.create_namespace(Arc::clone(&name), config.clone());
                namespaces.insert(name, Arc::new(namespace));
            }
        }

        info!(
            namespaces = manager.config.namespaces.len(),
            dynamic = manager.config.dynamic_namespaces,
            "cache manager initialized"
        );
        Ok(manager)
    }
}

// == Cache Manager ==
/// Namespaced cache with LRU eviction, TTL, stale-while-revalidate and
/// deduplicated read-through fetches.
///
/// Construct one per application and share it by reference or `Arc`.
/// `E` is the error type of fetch functions passed to
/// [`CacheManager::get_or_fetch`].
///
/// # Example
/// ```
/// use mini_cache::{CacheConfig, CacheManager, FetchOptions};
///
/// # tokio_test::block_on(async {
/// let cache: CacheManager<String, u64> = CacheManager::new(CacheConfig::default()).unwrap();
///
/// let value = cache
///     .get_or_fetch(
///         "users",
///         "users:age:7".to_string(),
///         |_key| async { anyhow::Ok(33) },
///         FetchOptions::default(),
///     )
///     .await
///     .unwrap();
/// assert_eq!(value, 33);
/// assert_eq!(cache.get("users", "users:age:7"), Some(33));
/// # });
/// ```
pub struct CacheManager<K, V, E = anyhow::Error> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn MetricsSink>>,
    namespaces: RwLock<HashMap<Arc<str>, Arc<Namespace<K, V>>>>,
    flights: Singleflight<K, V, E>,
    sweepers: Mutex<HashMap<Arc<str>, JoinHandle<()>>>,
    /// Set between `start_maintenance` and `shutdown`
    maintenance: AtomicBool,
    emergency_clears: AtomicU64,
}

impl<K, V, E> CacheManager<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    // == Constructors ==
    pub fn builder(config: CacheConfig) -> CacheManagerBuilder<K, V, E> {
        CacheManagerBuilder {
            config,
            clock: None,
            sink: None,
            _marker: PhantomData,
        }
    }

    /// Creates a manager with the system clock and no metrics sink.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Get ==
    /// Returns the cached value, fresh or within its stale-grace window.
    ///
    /// Never fetches. An unavailable namespace reads as a miss.
    pub fn get<Q>(&self, namespace: &str, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(ns) = self.namespace(namespace) else {
            debug!(namespace, "namespace unavailable, treating read as miss");
            return None;
        };
        let now = self.clock.now();
        let result = ns.store.lock().get(key, now);
        result.into_value()
    }

    /// True if `key` holds a servable value. Does not count as an access.
    pub fn contains<Q>(&self, namespace: &str, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(ns) = self.lookup_namespace(namespace) else {
            return false;
        };
        let now = self.clock.now();
        let found = ns.store.lock().peek(key, now).is_some();
        found
    }

    // == Set ==
    pub fn set(&self, namespace: &str, key: K, value: V) {
        self.set_with_options(namespace, key, value, SetOptions::default());
    }

    /// Stores `value`, overwriting and re-versioning any existing entry.
    pub fn set_with_options(&self, namespace: &str, key: K, value: V, options: SetOptions) {
        let Some(ns) = self.namespace(namespace) else {
            warn!(namespace, "namespace unavailable, dropping write");
            return;
        };
        let now = self.clock.now();
        ns.store.lock().set(key, value, options.ttl, now);
    }

    // == Delete ==
    /// Removes `key`, returning true if it was present.
    pub fn delete<Q>(&self, namespace: &str, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(ns) = self.lookup_namespace(namespace) else {
            return false;
        };
        let removed = ns.store.lock().delete(key);
        removed
    }

    // == Clear ==
    /// Drops every entry of one namespace. Other namespaces are untouched.
    pub fn clear(&self, namespace: &str) {
        if let Some(ns) = self.lookup_namespace(namespace) {
            ns.store.lock().clear();
            info!(namespace, "namespace cleared");
        }
    }

    /// Drops every entry of every namespace and forgets namespaces that were
    /// created on first use.
    ///
    /// Meant for emergencies; each call is logged and counted.
    pub fn clear_all(&self) {
        self.emergency_clears.fetch_add(1, Ordering::Relaxed);

        let mut namespaces = self.namespaces.write();
        for ns in namespaces.values() {
            ns.store.lock().clear();
        }

        let dynamic: Vec<Arc<str>> = namespaces
            .keys()
            .filter(|name| !self.config.namespaces.contains_key(&name[..]))
            .cloned()
            .collect();
        let mut sweepers = self.sweepers.lock();
        for name in &dynamic {
            namespaces.remove(name);
            if let Some(handle) = sweepers.remove(name) {
                handle.abort();
            }
        }

        warn!(
            namespaces = namespaces.len() + dynamic.len(),
            dropped = dynamic.len(),
            "clear_all: every cache entry dropped"
        );
    }

    // == Get Or Fetch ==
    /// Read-through lookup.
    ///
    /// - Fresh hit: returns the cached value.
    /// - Stale hit: returns the cached value at once and starts one
    ///   background revalidation; the caller never waits for it.
    /// - Miss: fetches through the singleflight coordinator, caches a
    ///   successful result and returns it. Concurrent callers for the same
    ///   key share one `fetch` call. Errors are returned, not cached.
    ///
    /// A fetched value is written back only if nothing newer was written to
    /// the key and the namespace was not cleared while it ran. An unavailable
    /// namespace falls back to calling `fetch` directly.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        namespace: &str,
        key: K,
        fetch: F,
        options: FetchOptions,
    ) -> Result<V, FetchError<E>>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let Some(ns) = self.namespace(namespace) else {
            debug!(namespace, "namespace unavailable, fetching without cache");
            return fetch_uncached(key, fetch, options.timeout).await;
        };

        let now = self.clock.now();
        let (result, token) = {
            let mut store = ns.store.lock();
            let result = store.get(&key, now);
            let token = store.write_token(&key);
            (result, token)
        };

        match result {
            CacheResult::Hit(value) => Ok(value),
            CacheResult::Stale(value) => {
                let flight = self.start_fetch(&ns, key, fetch, options.ttl, token, true);
                if flight.joined() {
                    ns.recorder.record(EventKind::StampedeAvoided);
                } else {
                    debug!(namespace, "serving stale value, revalidating in background");
                }
                Ok(value)
            }
            CacheResult::Miss => {
                let flight = self.start_fetch(&ns, key, fetch, options.ttl, token, false);
                if flight.joined() {
                    ns.recorder.record(EventKind::StampedeAvoided);
                }
                flight.wait_for(options.timeout).await
            }
        }
    }

    /// Joins or starts the fetch for `key`, committing its result to the
    /// namespace under `token`.
    fn start_fetch<F, Fut>(
        &self,
        ns: &Namespace<K, V>,
        key: K,
        fetch: F,
        ttl: Option<Duration>,
        token: WriteToken,
        revalidation: bool,
    ) -> Flight<V, E>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let name = Arc::clone(&ns.name);
        let store = Arc::clone(&ns.store);
        let stats = Arc::clone(ns.recorder.stats());
        let clock = Arc::clone(&self.clock);
        let commit_key = key.clone();

        self.flights
            .join_or_start(&ns.name, key, fetch, move |result| match result {
                Ok(value) => {
                    let now = clock.now();
                    let stored = store
                        .lock()
                        .set_if(commit_key, value.clone(), ttl, now, token);
                    if !stored {
                        debug!(namespace = %name, "fetched value superseded, discarded");
                    }
                }
                Err(_) if revalidation => {
                    stats.record_refresh_failure();
                    warn!(namespace = %name, "background revalidation failed, stale value kept");
                }
                Err(_) => {
                    debug!(namespace = %name, "fetch failed, nothing cached");
                }
            })
    }

    // == Statistics ==
    pub fn stats(&self) -> StatsSnapshot {
        let namespaces = self
            .namespaces
            .read()
            .iter()
            .map(|(name, ns)| (name.to_string(), ns.recorder.stats().snapshot()))
            .collect();

        StatsSnapshot {
            namespaces,
            emergency_clears: self.emergency_clears.load(Ordering::Relaxed),
        }
    }

    pub fn namespace_stats(&self, namespace: &str) -> Option<NamespaceSnapshot> {
        self.lookup_namespace(namespace)
            .map(|ns| ns.recorder.stats().snapshot())
    }

    /// Names of live namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .namespaces
            .read()
            .keys()
            .map(|name| name.to_string())
            .collect();
        names.sort();
        names
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }

    // == Maintenance ==
    /// Spawns a sweep task for every namespace that has a sweep interval,
    /// including namespaces created later.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_maintenance(&self) {
        if self.maintenance.swap(true, Ordering::SeqCst) {
            return;
        }
        let namespaces = self.namespaces.read();
        for ns in namespaces.values() {
            self.spawn_sweeper(ns);
        }
        drop(namespaces);
        info!(sweepers = self.sweepers.lock().len(), "cache maintenance started");
    }

    /// Stops every background sweep. Cached data stays available.
    pub fn shutdown(&self) {
        let _namespaces = self.namespaces.read();
        self.maintenance.store(false, Ordering::SeqCst);
        let mut sweepers = self.sweepers.lock();
        for (_, handle) in sweepers.drain() {
            handle.abort();
        }
        info!("cache maintenance stopped");
    }

    // == Namespace Plumbing ==
    /// Existing namespace, without creating one.
    fn lookup_namespace(&self, name: &str) -> Option<Arc<Namespace<K, V>>> {
        self.namespaces.read().get(name).cloned()
    }

    /// Existing namespace, created on first use when the config allows it.
    fn namespace(&self, name: &str) -> Option<Arc<Namespace<K, V>>> {
        if let Some(ns) = self.lookup_namespace(name) {
            return Some(ns);
        }
        let config = self.config.namespace_config(name)?.clone();

        let mut namespaces = self.namespaces.write();
        if let Some(ns) = namespaces.get(name) {
            return Some(Arc::clone(ns));
        }

        let ns = Arc::new(self.create_namespace(Arc::from(name), config));
        namespaces.insert(Arc::clone(&ns.name), Arc::clone(&ns));
        // A namespace and its sweeper are registered under one write lock.
        if self.maintenance.load(Ordering::SeqCst) {
            self.spawn_sweeper(&ns);
        }
        drop(namespaces);

        debug!(namespace = name, "namespace created on first use");
        Some(ns)
    }

    /// Every live namespace with a sweep interval has exactly one sweeper and
    /// no sweeper outlives its namespace.
    #[cfg(test)]
    fn assert_sweepers_consistent(&self) {
        let namespaces = self.namespaces.read();
        let sweepers = self.sweepers.lock();
        for name in sweepers.keys() {
            assert!(namespaces.contains_key(name), "sweeper without namespace: {name}");
        }
        if self.maintenance.load(Ordering::SeqCst) {
            for (name, ns) in namespaces.iter() {
                if ns.sweep_interval.is_some() {
                    assert!(sweepers.contains_key(name), "namespace without sweeper: {name}");
                }
            }
        }
    }

    fn create_namespace(&self, name: Arc<str>, config: NamespaceConfig) -> Namespace<K, V> {
        let recorder = Recorder::new(
            Arc::clone(&name),
            Arc::new(NamespaceStats::new()),
            self.sink.clone(),
        );
        let sweep_interval = config.sweep_interval;
        let store = NamespaceStore::with_recorder(config, recorder.clone());

        Namespace {
            name,
            store: Arc::new(Mutex::new(store)),
            recorder,
            sweep_interval,
        }
    }

    fn spawn_sweeper(&self, ns: &Namespace<K, V>) {
        let Some(interval) = ns.sweep_interval else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(namespace = %ns.name, "no tokio runtime, expiration sweep not started");
            return;
        }

        // Callers hold the namespaces lock, which orders this with `clear_all`.
        let mut sweepers = self.sweepers.lock();
        if !sweepers.contains_key(&ns.name) {
            let handle = spawn_sweep_task(
                Arc::clone(&ns.name),
                Arc::clone(&ns.store),
                Arc::clone(&self.clock),
                interval,
            );
            sweepers.insert(Arc::clone(&ns.name), handle);
        }
    }
}

impl<K, V, E> Drop for CacheManager<K, V, E> {
    fn drop(&mut self) {
        for (_, handle) in self.sweepers.get_mut().drain() {
            handle.abort();
        }
    }
}

impl<K, V, E> fmt::Debug for CacheManager<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("namespaces", &self.namespaces.read().len())
            .field("in_flight", &self.flights)
            .field("sweepers", &self.sweepers.lock().len())
            .finish()
    }
}

/// Calls `fetch` without caching, for namespaces that are unavailable.
async fn fetch_uncached<K, V, E, F, Fut>(
    key: K,
    fetch: F,
    timeout: Option<Duration>,
) -> Result<V, FetchError<E>>
where
    F: FnOnce(K) -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    let fetched = async move {
        fetch(key)
            .await
            .map_err(|err| FetchError::Upstream(Arc::new(err)))
    };
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fetched)
            .await
            .unwrap_or(Err(FetchError::Timeout)),
        None => fetched.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    const MS: Duration = Duration::from_millis(1);

    fn manager(config: CacheConfig) -> (CacheManager<String, i32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let manager = CacheManager::builder(config)
            .clock(clock.clone())
            .build()
            .unwrap();
        (manager, clock)
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = CacheConfig::default()
            .with_namespace("users", NamespaceConfig::new(0, Duration::from_secs(1)));
        let result: Result<CacheManager<String, i32>, _> = CacheManager::new(config);
        assert!(matches!(result, Err(ConfigError::InvalidCapacity { .. })));
    }

    #[test]
    fn test_configured_namespaces_exist_at_start() {
        let config = CacheConfig::default()
            .with_namespace("users", NamespaceConfig::default())
            .with_namespace("posts", NamespaceConfig::default());
        let (manager, _clock) = manager(config);

        assert_eq!(manager.namespaces(), vec!["posts", "users"]);
    }

    #[test]
    fn test_namespaces_created_lazily() {
        let (manager, _clock) = manager(CacheConfig::default());
        assert!(manager.namespaces().is_empty());

        manager.set("sessions", "a".to_string(), 1);

        assert_eq!(manager.namespaces(), vec!["sessions"]);
        assert_eq!(manager.get("sessions", "a"), Some(1));
    }

    #[test]
    fn test_unavailable_namespace_reads_as_miss() {
        let config = CacheConfig::default()
            .with_namespace("users", NamespaceConfig::default())
            .with_dynamic_namespaces(false);
        let (manager, _clock) = manager(config);

        manager.set("unknown", "a".to_string(), 1);

        assert_eq!(manager.get("unknown", "a"), None);
        assert!(!manager.delete("unknown", "a"));
        assert!(!manager.contains("unknown", "a"));
        assert_eq!(manager.namespaces(), vec!["users"]);
    }

    #[test]
    fn test_set_with_ttl_override() {
        let (manager, clock) = manager(CacheConfig::default());

        manager.set_with_options("users", "a".to_string(), 1, SetOptions::with_ttl(10 * MS));
        clock.advance(5 * MS);
        assert_eq!(manager.get("users", "a"), Some(1));

        clock.advance(10 * MS);
        assert_eq!(manager.get("users", "a"), None);
    }

    #[test]
    fn test_contains_does_not_count() {
        let (manager, _clock) = manager(CacheConfig::default());
        manager.set("users", "a".to_string(), 1);

        assert!(manager.contains("users", "a"));
        assert!(!manager.contains("users", "b"));

        let stats = manager.namespace_stats("users").unwrap();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_clear_all_counts_and_drops_dynamic_namespaces() {
        let config = CacheConfig::default().with_namespace("users", NamespaceConfig::default());
        let (manager, _clock) = manager(config);
        manager.set("users", "a".to_string(), 1);
        manager.set("sessions", "b".to_string(), 2);

        manager.clear_all();

        assert_eq!(manager.namespaces(), vec!["users"]);
        assert_eq!(manager.get("users", "a"), None);
        assert_eq!(manager.stats().emergency_clears, 1);
    }

    #[tokio::test]
    async fn test_maintenance_sweeps_lazily_created_namespaces() {
        let defaults = NamespaceConfig::new(10, 10 * MS).with_sweep_interval(10 * MS);
        let (manager, clock) = manager(CacheConfig::default().with_defaults(defaults));
        manager.start_maintenance();

        manager.set("sessions", "a".to_string(), 1);
        clock.advance(20 * MS);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let stats = manager.namespace_stats("sessions").unwrap();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.expirations, 1);

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_recreated_namespace_gets_fresh_sweeper() {
        let defaults = NamespaceConfig::new(10, 10 * MS).with_sweep_interval(10 * MS);
        let (manager, clock) = manager(CacheConfig::default().with_defaults(defaults));
        manager.start_maintenance();

        manager.set("sessions", "a".to_string(), 1);
        manager.clear_all();
        manager.assert_sweepers_consistent();

        manager.set("sessions", "b".to_string(), 2);
        manager.assert_sweepers_consistent();
        clock.advance(20 * MS);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let stats = manager.namespace_stats("sessions").unwrap();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.expirations, 1);

        manager.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clear_all_racing_namespace_creation_keeps_sweepers_consistent() {
        let defaults = NamespaceConfig::new(10, Duration::from_secs(60))
            .with_sweep_interval(Duration::from_secs(60));
        let (manager, _clock) = manager(CacheConfig::default().with_defaults(defaults));
        let manager = Arc::new(manager);
        manager.start_maintenance();

        let writers: Vec<_> = (0..4)
            .map(|worker| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    for i in 0..200 {
                        manager.set(&format!("ns-{}", i % 3), format!("{worker}-{i}"), i);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        let clearer = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                for _ in 0..200 {
                    manager.clear_all();
                    tokio::task::yield_now().await;
                }
            })
        };

        for writer in writers {
            writer.await.unwrap();
        }
        clearer.await.unwrap();

        manager.assert_sweepers_consistent();
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_uncached_fetch_honors_timeout() {
        let result: Result<i32, FetchError<()>> = fetch_uncached(
            "k".to_string(),
            |_key| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(1)
            },
            Some(10 * MS),
        )
        .await;

        assert!(matches!(result, Err(FetchError::Timeout)));
    }
}

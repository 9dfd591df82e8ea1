//! Expiration Sweep Task
//!
//! Background task that periodically removes entries past their stale-grace
//! window from one namespace, bounding memory for namespaces that are
//! written often but rarely read.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{Clock, NamespaceStore};

/// Spawns a background task that sweeps expired entries out of `store`.
///
/// The task sleeps for `interval` between sweeps and takes the namespace
/// lock only for the sweep itself, so it serializes with foreground reads
/// and writes like any other operation.
///
/// # Arguments
/// * `namespace` - Namespace name, for logging
/// * `store` - The namespace store shared with the cache manager
/// * `clock` - Clock deciding what has expired
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, aborted by the cache manager on
/// shutdown.
pub fn spawn_sweep_task<K, V>(
    namespace: Arc<str>,
    store: Arc<Mutex<NamespaceStore<K, V>>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        info!(
            namespace = %namespace,
            interval = %humantime::format_duration(interval),
            "starting expiration sweep"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let now = clock.now();
                store.lock().sweep_expired(now)
            };

            if removed > 0 {
                info!(namespace = %namespace, removed, "expiration sweep removed entries");
            } else {
                debug!(namespace = %namespace, "expiration sweep found nothing");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheResult, ManualClock};
    use crate::config::NamespaceConfig;

    const MS: Duration = Duration::from_millis(1);

    fn shared_store(ttl: Duration) -> Arc<Mutex<NamespaceStore<String, String>>> {
        Arc::new(Mutex::new(NamespaceStore::new(
            "test",
            NamespaceConfig::new(100, ttl),
        )))
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let clock = Arc::new(ManualClock::new());
        let store = shared_store(10 * MS);
        store
            .lock()
            .set("expire_soon".to_string(), "value".to_string(), None, clock.now());

        let handle = spawn_sweep_task("test".into(), store.clone(), clock.clone(), 10 * MS);

        clock.advance(20 * MS);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(store.lock().is_empty(), "Expired entry should have been swept");
        assert_eq!(store.lock().stats().snapshot().expirations, 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let clock = Arc::new(ManualClock::new());
        let store = shared_store(Duration::from_secs(3600));
        store
            .lock()
            .set("long_lived".to_string(), "value".to_string(), None, clock.now());

        let handle = spawn_sweep_task("test".into(), store.clone(), clock.clone(), 10 * MS);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let now = clock.now();
        assert_eq!(
            store.lock().get("long_lived", now),
            CacheResult::Hit("value".to_string())
        );

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_can_be_aborted() {
        let clock = Arc::new(ManualClock::new());
        let handle = spawn_sweep_task("test".into(), shared_store(MS), clock, 10 * MS);

        handle.abort();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}

//! Singleflight Module
//!
//! Collapses concurrent fetches for the same `(namespace, key)` into one
//! upstream call whose result every caller shares.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::FetchError;

/// Result of one fetch as every waiter sees it.
pub type FlightResult<V, E> = Result<V, Arc<E>>;

type FlightChannel<V, E> = Shared<oneshot::Receiver<FlightResult<V, E>>>;
type FlightMap<K, V, E> = Arc<Mutex<HashMap<FlightKey<K>, FlightChannel<V, E>>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FlightKey<K> {
    namespace: Arc<str>,
    key: K,
}

/// Runs the wrapped closure when dropped, including during unwinding.
struct CallOnDrop {
    f: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CallOnDrop {
    fn new<F: FnOnce() + Send + 'static>(f: F) -> CallOnDrop {
        CallOnDrop {
            f: Some(Box::new(f)),
        }
    }
}

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

// == Flight ==
/// Handle on an in-flight fetch.
///
/// Dropping the handle, or timing out while waiting on it, does not cancel
/// the fetch; other waiters still receive its result.
pub struct Flight<V, E> {
    channel: FlightChannel<V, E>,
    joined: bool,
}

impl<V, E> Flight<V, E>
where
    V: Clone,
{
    /// True if this caller attached to a fetch someone else started.
    pub fn joined(&self) -> bool {
        self.joined
    }

    /// Waits for the fetch to resolve.
    pub async fn wait(self) -> Result<V, FetchError<E>> {
        match self.channel.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(FetchError::Upstream(err)),
            Err(_canceled) => Err(FetchError::Aborted),
        }
    }

    /// Waits at most `timeout` (forever when `None`).
    pub async fn wait_for(self, timeout: Option<Duration>) -> Result<V, FetchError<E>> {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.wait())
                .await
                .unwrap_or(Err(FetchError::Timeout)),
            None => self.wait().await,
        }
    }
}

// == Singleflight ==
/// Tracks in-flight fetches by `(namespace, key)`.
///
/// A record exists only while its fetch runs. The first caller spawns the
/// fetch on the current tokio runtime; every caller arriving before it
/// resolves attaches to the same record. Errors are shared with every
/// waiter and then forgotten, so the next caller fetches again.
pub struct Singleflight<K, V, E> {
    flights: FlightMap<K, V, E>,
}

impl<K, V, E> Singleflight<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // == Run ==
    /// Fetches `key` through `fetch`, sharing the call with concurrent
    /// callers for the same `(namespace, key)`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn run<F, Fut>(&self, namespace: &str, key: K, fetch: F) -> Result<V, FetchError<E>>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.join_or_start(&Arc::from(namespace), key, fetch, |_| {})
            .wait()
            .await
    }

    // == Join Or Start ==
    /// Attaches to the fetch for `(namespace, key)`, starting it if none runs.
    ///
    /// A started fetch calls `on_complete` with its result before the record
    /// is removed, so a value written there is visible to any caller that
    /// no longer finds the record. `fetch` and `on_complete` are dropped
    /// unused when the caller joins an existing fetch.
    pub fn join_or_start<F, Fut, C>(
        &self,
        namespace: &Arc<str>,
        key: K,
        fetch: F,
        on_complete: C,
    ) -> Flight<V, E>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        C: FnOnce(&FlightResult<V, E>) + Send + 'static,
    {
        let flight_key = FlightKey {
            namespace: Arc::clone(namespace),
            key,
        };

        let mut flights = self.flights.lock();
        if let Some(channel) = flights.get(&flight_key) {
            return Flight {
                channel: channel.clone(),
                joined: true,
            };
        }

        let channel = self.spawn(flight_key.clone(), fetch, on_complete);
        let previous = flights.insert(flight_key, channel.clone());
        debug_assert!(previous.is_none());

        Flight {
            channel,
            joined: false,
        }
    }

    fn spawn<F, Fut, C>(
        &self,
        flight_key: FlightKey<K>,
        fetch: F,
        on_complete: C,
    ) -> FlightChannel<V, E>
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        C: FnOnce(&FlightResult<V, E>) + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let key = flight_key.key.clone();

        let flights = Arc::clone(&self.flights);
        let remove_flight = CallOnDrop::new(move || {
            flights.lock().remove(&flight_key);
        });

        tokio::spawn(async move {
            let result = fetch(key).await.map_err(Arc::new);
            on_complete(&result);
            // Leave the map before publishing: callers either get a channel
            // that will receive data, or they start a new fetch.
            drop(remove_flight);
            sender.send(result).ok();
        });

        receiver.shared()
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    pub fn is_in_flight(&self, namespace: &str, key: &K) -> bool {
        let flight_key = FlightKey {
            namespace: Arc::from(namespace),
            key: key.clone(),
        };
        self.flights.lock().contains_key(&flight_key)
    }
}

impl<K, V, E> Default for Singleflight<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> Clone for Singleflight<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<K, V, E> fmt::Debug for Singleflight<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Singleflight")
            .field("in_flight", &self.flights.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use futures::future::join_all;

    #[derive(Debug, PartialEq)]
    struct Boom;

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl FnOnce(String) -> futures::future::BoxFuture<'static, Result<String, Boom>> {
        let calls = Arc::clone(calls);
        move |key: String| {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(format!("value-of-{key}"))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_one_fetch() {
        let flights: Singleflight<String, String, Boom> = Singleflight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let results = join_all((0..50).map(|_| {
            flights.run(
                "users",
                "k".to_string(),
                counting_fetch(&calls, Duration::from_millis(50)),
            )
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 50);
        for result in results {
            assert_eq!(result.unwrap(), "value-of-k");
        }
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_and_namespaces_do_not_share() {
        let flights: Singleflight<String, String, Boom> = Singleflight::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(20);

        let (a, b, c) = tokio::join!(
            flights.run("users", "a".to_string(), counting_fetch(&calls, delay)),
            flights.run("users", "b".to_string(), counting_fetch(&calls, delay)),
            flights.run("posts", "a".to_string(), counting_fetch(&calls, delay)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(a.unwrap(), "value-of-a");
        assert_eq!(b.unwrap(), "value-of-b");
        assert_eq!(c.unwrap(), "value-of-a");
    }

    #[tokio::test]
    async fn test_error_is_shared_then_forgotten() {
        let flights: Singleflight<String, String, Boom> = Singleflight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = |calls: &Arc<AtomicUsize>| {
            let calls = Arc::clone(calls);
            move |_key: String| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err::<String, _>(Boom)
            }
        };

        let (first, second) = tokio::join!(
            flights.run("users", "k".to_string(), failing(&calls)),
            flights.run("users", "k".to_string(), failing(&calls)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match (first, second) {
            (Err(FetchError::Upstream(a)), Err(FetchError::Upstream(b))) => {
                assert!(Arc::ptr_eq(&a, &b))
            }
            other => panic!("expected shared upstream errors, got {other:?}"),
        }

        let retry = flights
            .run("users", "k".to_string(), counting_fetch(&calls, Duration::ZERO))
            .await;
        assert_eq!(retry.unwrap(), "value-of-k");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_join_reports_joined() {
        let flights: Singleflight<String, String, Boom> = Singleflight::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let namespace: Arc<str> = Arc::from("users");
        let delay = Duration::from_millis(20);

        let first = flights.join_or_start(
            &namespace,
            "k".to_string(),
            counting_fetch(&calls, delay),
            |_| {},
        );
        let second = flights.join_or_start(
            &namespace,
            "k".to_string(),
            counting_fetch(&calls, delay),
            |_| {},
        );

        assert!(!first.joined());
        assert!(second.joined());
        assert!(flights.is_in_flight("users", &"k".to_string()));

        let (a, b) = tokio::join!(first.wait(), second.wait());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flights.is_in_flight("users", &"k".to_string()));
    }

    #[tokio::test]
    async fn test_on_complete_runs_before_record_removed() {
        let flights: Singleflight<String, String, Boom> = Singleflight::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_in_flight = Arc::new(AtomicBool::new(false));

        let observer = flights.clone();
        let seen = Arc::clone(&seen_in_flight);
        let flight = flights.join_or_start(
            &Arc::from("users"),
            "k".to_string(),
            counting_fetch(&calls, Duration::ZERO),
            move |result| {
                assert!(result.is_ok());
                seen.store(
                    observer.is_in_flight("users", &"k".to_string()),
                    Ordering::SeqCst,
                );
            },
        );

        flight.wait().await.unwrap();
        assert!(seen_in_flight.load(Ordering::SeqCst));
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_timeout_does_not_cancel_fetch() {
        let flights: Singleflight<String, String, Boom> = Singleflight::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let namespace: Arc<str> = Arc::from("users");
        let delay = Duration::from_millis(100);

        let impatient = flights.join_or_start(
            &namespace,
            "k".to_string(),
            counting_fetch(&calls, delay),
            |_| {},
        );
        let patient = flights.join_or_start(
            &namespace,
            "k".to_string(),
            counting_fetch(&calls, delay),
            |_| {},
        );

        let timed_out = impatient.wait_for(Some(Duration::from_millis(10))).await;
        assert!(matches!(timed_out, Err(FetchError::Timeout)));

        assert_eq!(patient.wait_for(None).await.unwrap(), "value-of-k");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_fetch_aborts_waiters() {
        let flights: Singleflight<String, String, Boom> = Singleflight::new();

        let result = flights
            .run("users", "k".to_string(), |_key: String| async move {
                if true {
                    panic!("fetch exploded");
                }
                Ok::<String, Boom>(String::new())
            })
            .await;

        assert!(matches!(result, Err(FetchError::Aborted)));
        assert_eq!(flights.in_flight(), 0);
    }
}

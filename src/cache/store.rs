//! Namespace Store Module
//!
//! One namespace's entries: LRU index plus TTL and stale-grace policy.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::metrics::Recorder;
use crate::cache::{Entry, EventKind, EvictionIndex, Freshness, NamespaceStats, Timestamp};
use crate::config::NamespaceConfig;

// == Cache Result ==
/// Outcome of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheResult<V> {
    /// Fresh value
    Hit(V),
    /// Past its TTL but inside the stale-grace window; serve it and refresh
    Stale(V),
    /// Nothing servable
    Miss,
}

impl<V> CacheResult<V> {
    /// The servable value, fresh or stale.
    pub fn into_value(self) -> Option<V> {
        match self {
            CacheResult::Hit(value) | CacheResult::Stale(value) => Some(value),
            CacheResult::Miss => None,
        }
    }
}

// == Write Token ==
/// What a key looked like when a fetch for it started.
///
/// Committing the fetched value with [`NamespaceStore::set_if`] succeeds only
/// if nothing newer was written in the meantime and the namespace was not
/// cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteToken {
    generation: u64,
    version: Option<u64>,
}

// == Namespace Store ==
/// Entries of a single namespace.
///
/// Not synchronized; the cache manager wraps each store in its own lock.
#[derive(Debug)]
pub struct NamespaceStore<K, V> {
    config: NamespaceConfig,
    index: EvictionIndex<K, Entry<V>>,
    recorder: Recorder,
    /// Last version handed out; versions never repeat within a store
    last_version: u64,
    /// Bumped by every `clear`
    generation: u64,
}

impl<K, V> NamespaceStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates an empty store with its own statistics and no metrics sink.
    pub fn new(name: impl Into<Arc<str>>, config: NamespaceConfig) -> Self {
        let recorder = Recorder::new(name.into(), Arc::new(NamespaceStats::new()), None);
        Self::with_recorder(config, recorder)
    }

    pub(crate) fn with_recorder(config: NamespaceConfig, recorder: Recorder) -> Self {
        Self {
            index: EvictionIndex::new(config.capacity),
            config,
            recorder,
            last_version: 0,
            generation: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.recorder.namespace()
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<NamespaceStats> {
        self.recorder.stats()
    }

    // == Get ==
    /// Looks up `key` at `now`, recording a hit or miss.
    ///
    /// Fresh and stale entries become most recently used. An entry past its
    /// stale-grace window is removed here and counted as an expiration.
    pub fn get<Q>(&mut self, key: &Q, now: Timestamp) -> CacheResult<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let freshness = match self.index.peek(key) {
            Some(entry) => entry.freshness(now),
            None => {
                self.recorder.record(EventKind::Miss);
                return CacheResult::Miss;
            }
        };

        if freshness == Freshness::Expired {
            self.index.remove(key);
            self.recorder.record(EventKind::Expiration);
            self.recorder.record(EventKind::Miss);
            self.sync_size();
            return CacheResult::Miss;
        }

        let Some(entry) = self.index.get_mut(key) else {
            self.recorder.record(EventKind::Miss);
            return CacheResult::Miss;
        };
        entry.touch(now);
        let value = entry.value.clone();
        self.recorder.record(EventKind::Hit);

        match freshness {
            Freshness::Stale => CacheResult::Stale(value),
            _ => CacheResult::Hit(value),
        }
    }

    /// Returns the entry if it is still servable, without touching recency
    /// or statistics.
    pub fn peek<Q>(&self, key: &Q, now: Timestamp) -> Option<&Entry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.peek(key).filter(|entry| !entry.is_expired(now))
    }

    // == Set ==
    /// Stores `value` under `key`, returning the version assigned to it.
    ///
    /// Overwrites reset the timestamps and take a new version. A new key in a
    /// full store evicts exactly one least recently used entry first.
    ///
    /// # Arguments
    /// * `ttl` - Fresh window for this entry, the namespace TTL when `None`
    pub fn set(&mut self, key: K, value: V, ttl: Option<Duration>, now: Timestamp) -> u64 {
        self.last_version += 1;
        let version = self.last_version;
        let ttl = ttl.unwrap_or(self.config.ttl);
        let entry = Entry::new(value, now, ttl, self.config.stale_grace, version);

        if self.index.insert(key, entry).is_some() {
            self.recorder.record(EventKind::Eviction);
            debug!(namespace = %self.name(), "evicted least recently used entry");
        }
        self.sync_size();
        version
    }

    /// Captures the current state of `key` for a later [`NamespaceStore::set_if`].
    pub fn write_token<Q>(&self, key: &Q) -> WriteToken
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        WriteToken {
            generation: self.generation,
            version: self.index.peek(key).map(|entry| entry.version),
        }
    }

    /// Stores `value` only if `key` was not rewritten and the namespace was
    /// not cleared since `token` was taken. Returns whether it was stored.
    pub fn set_if(
        &mut self,
        key: K,
        value: V,
        ttl: Option<Duration>,
        now: Timestamp,
        token: WriteToken,
    ) -> bool {
        if token.generation != self.generation {
            return false;
        }
        if let Some(current) = self.index.peek(&key) {
            if Some(current.version) != token.version {
                return false;
            }
        }
        self.set(key, value, ttl, now);
        true
    }

    // == Delete ==
    /// Removes `key`, returning true if it was present.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.index.remove(key).is_some();
        if removed {
            self.sync_size();
        }
        removed
    }

    // == Clear ==
    /// Drops every entry. Fetches already in flight will not write back.
    pub fn clear(&mut self) {
        self.index.clear();
        self.generation += 1;
        self.sync_size();
    }

    // == Sweep Expired ==
    /// Removes every entry past its stale-grace window.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&mut self, now: Timestamp) -> usize {
        let removed = self.index.retain(|_, entry| !entry.is_expired(now));
        for _ in &removed {
            self.recorder.record(EventKind::Expiration);
        }
        self.sync_size();
        removed.len()
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Least recently used key, for inspection.
    pub fn peek_lru(&self) -> Option<&K> {
        self.index.peek_lru()
    }

    fn sync_size(&self) {
        self.recorder.stats().set_size(self.index.len());
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.index.assert_consistent();
        assert!(self.index.len() <= self.config.capacity);
    }
}

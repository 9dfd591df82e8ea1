//! Cache Statistics Module
//!
//! Tracks per-namespace counters with atomic increments so snapshots never
//! block writers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use crate::cache::EventKind;

// == Namespace Stats ==
/// Live counters for one namespace.
///
/// Every counter except `size` only ever grows. Reads are not linearizable
/// with concurrent writers, but no counter is ever observed torn.
#[derive(Debug, Default)]
pub struct NamespaceStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    stampedes_avoided: AtomicU64,
    refresh_failures: AtomicU64,
    size: AtomicUsize,
}

impl NamespaceStats {
    // == Constructor ==
    /// Creates a new NamespaceStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Event ==
    /// Increments the counter matching `kind`.
    pub fn record(&self, kind: EventKind) {
        let counter = match kind {
            EventKind::Hit => &self.hits,
            EventKind::Miss => &self.misses,
            EventKind::Eviction => &self.evictions,
            EventKind::Expiration => &self.expirations,
            EventKind::StampedeAvoided => &self.stampedes_avoided,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a background revalidation whose fetch failed.
    pub fn record_refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    // == Update Entry Count ==
    pub fn set_size(&self, size: usize) {
        self.size.store(size, Ordering::Relaxed);
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> NamespaceSnapshot {
        NamespaceSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            stampedes_avoided: self.stampedes_avoided.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            size: self.size.load(Ordering::Relaxed),
        }
    }
}

// == Namespace Snapshot ==
/// Point-in-time copy of one namespace's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceSnapshot {
    /// Reads served from the cache, stale reads included
    pub hits: u64,
    /// Reads that found nothing servable
    pub misses: u64,
    /// Entries dropped to respect the capacity bound
    pub evictions: u64,
    /// Entries dropped after their stale-grace window elapsed
    pub expirations: u64,
    /// Callers that joined an in-flight fetch instead of starting one
    pub stampedes_avoided: u64,
    /// Background revalidations whose fetch failed
    pub refresh_failures: u64,
    /// Current number of entries
    pub size: usize,
}

impl NamespaceSnapshot {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Snapshot ==
/// Snapshot of every namespace known to a cache manager.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub namespaces: BTreeMap<String, NamespaceSnapshot>,
    /// Number of `clear_all` calls
    pub emergency_clears: u64,
}

impl StatsSnapshot {
    pub fn namespace(&self, name: &str) -> Option<&NamespaceSnapshot> {
        self.namespaces.get(name)
    }

    /// Sums every namespace into one set of counters.
    pub fn totals(&self) -> NamespaceSnapshot {
        self.namespaces
            .values()
            .fold(NamespaceSnapshot::default(), |mut acc, ns| {
                acc.hits += ns.hits;
                acc.misses += ns.misses;
                acc.evictions += ns.evictions;
                acc.expirations += ns.expirations;
                acc.stampedes_avoided += ns.stampedes_avoided;
                acc.refresh_failures += ns.refresh_failures;
                acc.size += ns.size;
                acc
            })
    }

    pub fn hit_rate(&self) -> f64 {
        self.totals().hit_rate()
    }
}

//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and stale-grace support.

use std::time::Duration;

use crate::cache::Timestamp;

/// Longest TTL or stale grace an entry can carry.
///
/// Deadlines are computed by adding to a monotonic [`Timestamp`], which has
/// no representable "forever", so longer requests are clamped to this.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

// == Freshness ==
/// How an entry looks at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Before `expires_at`.
    Fresh,
    /// Past `expires_at` but before `stale_until`.
    Stale,
    /// Past `stale_until`; the entry must not be served.
    Expired,
}

// == Cache Entry ==
/// A single cached value with its timestamps and version.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// The stored value
    pub value: V,
    /// When the entry was written
    pub created_at: Timestamp,
    /// End of the fresh window
    pub expires_at: Timestamp,
    /// End of the stale-grace window, equal to `expires_at` when SWR is off
    pub stale_until: Timestamp,
    /// Last successful read or write
    pub last_accessed_at: Timestamp,
    /// Store-wide write version, strictly increasing across writes
    pub version: u64,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates an entry written at `now`.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `now` - Write time
    /// * `ttl` - Fresh window, clamped to [`MAX_TTL`]
    /// * `stale_grace` - Extra window during which the value may be served stale
    /// * `version` - Version assigned by the owning store
    pub fn new(
        value: V,
        now: Timestamp,
        ttl: Duration,
        stale_grace: Duration,
        version: u64,
    ) -> Self {
        let expires_at = now + ttl.min(MAX_TTL);
        let stale_until = expires_at + stale_grace.min(MAX_TTL);

        Self {
            value,
            created_at: now,
            expires_at,
            stale_until,
            last_accessed_at: now,
            version,
        }
    }

    // == Freshness ==
    /// Classifies the entry at `now`.
    ///
    /// Boundaries are exclusive on the far side: at exactly `expires_at` the
    /// entry is already stale, at exactly `stale_until` it is expired.
    pub fn freshness(&self, now: Timestamp) -> Freshness {
        if now < self.expires_at {
            Freshness::Fresh
        } else if now < self.stale_until {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// True once the stale-grace window has also elapsed.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.freshness(now) == Freshness::Expired
    }

    /// Remaining fresh time, zero once stale.
    pub fn ttl_remaining(&self, now: Timestamp) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    pub fn touch(&mut self, now: Timestamp) {
        self.last_accessed_at = now;
    }
}

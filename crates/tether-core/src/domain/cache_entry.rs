//! Cache entries with time-to-live
//!
//! A cached value is valid only while `now - fetched_at < ttl`. Lookups
//! report expired entries instead of dropping them so callers can fall
//! back to stale data when a live fetch fails.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::newtypes::Timestamp;

/// A cached value and the time it was stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: Timestamp,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, fetched_at: Timestamp) -> Self {
        Self { value, fetched_at }
    }

    /// True while `now - fetched_at < ttl`
    #[must_use]
    pub fn is_fresh(&self, now: Timestamp, ttl: Duration) -> bool {
        self.fetched_at.elapsed_until(now) < ttl
    }

    /// Classify this entry against a TTL
    pub fn classify(self, now: Timestamp, ttl: Duration) -> CacheLookup<T> {
        if self.is_fresh(now, ttl) {
            CacheLookup::Fresh(self)
        } else {
            CacheLookup::Expired(self)
        }
    }
}

/// Result of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    /// Entry exists and is within its TTL
    Fresh(CacheEntry<T>),
    /// Entry exists but its TTL has elapsed (or it was invalidated)
    Expired(CacheEntry<T>),
    /// No entry for the key
    Missing,
}

impl<T> CacheLookup<T> {
    /// The value if fresh
    pub fn fresh(self) -> Option<T> {
        match self {
            CacheLookup::Fresh(entry) => Some(entry.value),
            _ => None,
        }
    }

    /// The value regardless of freshness
    pub fn any(self) -> Option<T> {
        match self {
            CacheLookup::Fresh(entry) | CacheLookup::Expired(entry) => Some(entry.value),
            CacheLookup::Missing => None,
        }
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheLookup::Fresh(_))
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, CacheLookup::Missing)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheLookup<U> {
        match self {
            CacheLookup::Fresh(e) => CacheLookup::Fresh(CacheEntry::new(f(e.value), e.fetched_at)),
            CacheLookup::Expired(e) => {
                CacheLookup::Expired(CacheEntry::new(f(e.value), e.fetched_at))
            }
            CacheLookup::Missing => CacheLookup::Missing,
        }
    }
}

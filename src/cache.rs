//! TTL cache for comparison results
//!
//! Callers own the cache and pass it where needed; nothing in the crate keeps
//! a process-wide instance.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::cohort::{compare, CohortComparison};
use crate::features::FeatureRecord;

/// A cached value and when it was stored
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
    pub data: T,
    pub cached_at: Instant,
}

impl<T> CachedEntry<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
        }
    }

    /// Whether the entry is younger than `ttl`
    pub fn is_valid(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }
}

/// String-keyed cache with a fixed time-to-live
pub struct ComparisonCache<T> {
    entries: RwLock<HashMap<String, CachedEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone> ComparisonCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`; expired entries are treated as absent
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().ok()?;
        match entries.get(key) {
            Some(entry) if entry.is_valid(self.ttl) => {
                debug!(key, "Comparison cache hit");
                Some(entry.data.clone())
            }
            _ => {
                debug!(key, "Comparison cache miss");
                None
            }
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: T) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), CachedEntry::new(value));
        }
    }

    /// Return the cached value, computing and storing it on a miss
    pub fn get_or_insert_with(&self, key: &str, compute: impl FnOnce() -> T) -> T {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }

    /// Drop every expired entry, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(self.ttl));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired comparison cache entries");
        }
        evicted
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

/// Compare two cohorts, reusing a cached result stored under `key`
pub fn compare_cached(
    cache: &ComparisonCache<CohortComparison>,
    key: &str,
    success: &[FeatureRecord],
    failure: &[FeatureRecord],
) -> CohortComparison {
    cache.get_or_insert_with(key, || compare(success, failure))
}

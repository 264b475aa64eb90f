//! Cache data types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// One cached value with its freshness metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub namespace: String,
    pub payload: serde_json::Value,
    pub stored_at: SystemTime,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// Age of the entry at `now`. A clock that moved backwards yields zero.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.stored_at).unwrap_or(Duration::ZERO)
    }

    /// Fresh iff `now - stored_at < ttl`
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        self.age(now) < Duration::from_secs(self.ttl_seconds)
    }
}

/// Outcome of a cache read
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<T> {
    pub hit: bool,
    pub value: Option<T>,
}

impl<T> CacheLookup<T> {
    pub fn hit(value: T) -> Self {
        Self {
            hit: true,
            value: Some(value),
        }
    }

    pub fn miss() -> Self {
        Self {
            hit: false,
            value: None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        self.value
    }
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_bytes: usize,
    pub keys_by_namespace: BTreeMap<String, Vec<String>>,
}

impl CacheStats {
    pub fn namespace_count(&self, namespace: &str) -> usize {
        self.keys_by_namespace
            .get(namespace)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

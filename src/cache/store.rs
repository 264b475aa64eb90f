//! Namespaced TTL cache over a durable key-value medium
//!
//! Entries are stored under `cache:<namespace>:<key>`. Staleness is evaluated
//! lazily on read: a stale entry is evicted and reported as a miss. Read-side
//! storage failures degrade to misses so a broken medium never fails the caller.

use crate::cache::error::{CacheError, CacheResult};
use crate::cache::storage::KeyValueStore;
use crate::cache::types::{CacheEntry, CacheLookup, CacheStats};
use crate::core::time::TimeProvider;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

const CACHE_PREFIX: &str = "cache:";

/// Shared, explicitly constructed cache instance
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn TimeProvider>,
}

impl CacheStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { store, clock }
    }

    fn validate_namespace(namespace: &str) -> CacheResult<()> {
        if namespace.is_empty() {
            return Err(CacheError::InvalidNamespace {
                namespace: namespace.to_string(),
                reason: "namespace cannot be empty".to_string(),
            });
        }
        if namespace.contains(':') {
            return Err(CacheError::InvalidNamespace {
                namespace: namespace.to_string(),
                reason: "namespace cannot contain ':'".to_string(),
            });
        }
        Ok(())
    }

    fn namespace_prefix(namespace: &str) -> String {
        format!("{}{}:", CACHE_PREFIX, namespace)
    }

    fn storage_key(namespace: &str, key: &str) -> String {
        format!("{}{}:{}", CACHE_PREFIX, namespace, key)
    }

    /// Split `cache:<namespace>:<key>` back into its parts
    fn split_storage_key(storage_key: &str) -> Option<(&str, &str)> {
        storage_key.strip_prefix(CACHE_PREFIX)?.split_once(':')
    }

    fn evict(&self, storage_key: &str) {
        if let Err(e) = self.store.remove(storage_key) {
            log::warn!("Failed to evict cache entry {}: {}", storage_key, e);
        }
    }

    /// Read a fresh value; stale, corrupt or unreadable entries are misses
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> CacheLookup<T> {
        if let Err(e) = Self::validate_namespace(namespace) {
            log::warn!("Cache read rejected: {}", e);
            return CacheLookup::miss();
        }
        let storage_key = Self::storage_key(namespace, key);

        let raw = match self.store.get(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheLookup::miss(),
            Err(e) => {
                log::warn!("Cache read for {} degraded to miss: {}", storage_key, e);
                return CacheLookup::miss();
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Evicting corrupt cache entry {}: {}", storage_key, e);
                self.evict(&storage_key);
                return CacheLookup::miss();
            }
        };

        if !entry.is_fresh(self.clock.system_time()) {
            log::debug!(
                "Cache entry {} is stale (ttl {}s); evicting",
                storage_key,
                entry.ttl_seconds
            );
            self.evict(&storage_key);
            return CacheLookup::miss();
        }

        match serde_json::from_value(entry.payload) {
            Ok(value) => {
                log::trace!("Cache hit for {}", storage_key);
                CacheLookup::hit(value)
            }
            Err(e) => {
                log::warn!("Evicting cache entry {} with unexpected shape: {}", storage_key, e);
                self.evict(&storage_key);
                CacheLookup::miss()
            }
        }
    }

    /// Store `value`, overwriting any previous entry (last writer wins)
    pub fn set<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> CacheResult<()> {
        Self::validate_namespace(namespace)?;
        let entry = CacheEntry {
            key: key.to_string(),
            namespace: namespace.to_string(),
            payload: serde_json::to_value(value)?,
            stored_at: self.clock.system_time(),
            ttl_seconds,
        };
        let raw = serde_json::to_vec(&entry)?;
        self.store.put(&Self::storage_key(namespace, key), &raw)?;
        log::trace!("Cached {}:{} for {}s", namespace, key, ttl_seconds);
        Ok(())
    }

    /// Remove one entry regardless of freshness
    pub fn invalidate(&self, namespace: &str, key: &str) -> CacheResult<bool> {
        Self::validate_namespace(namespace)?;
        Ok(self.store.remove(&Self::storage_key(namespace, key))?)
    }

    /// Remove every entry of one namespace regardless of freshness
    pub fn invalidate_namespace(&self, namespace: &str) -> CacheResult<usize> {
        Self::validate_namespace(namespace)?;
        self.remove_prefix(&Self::namespace_prefix(namespace))
    }

    /// Remove every cache entry in every namespace; non-cache data is untouched
    pub fn invalidate_all(&self) -> CacheResult<usize> {
        self.remove_prefix(CACHE_PREFIX)
    }

    fn remove_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let keys = self.store.keys_with_prefix(prefix)?;
        let mut removed = 0;
        for key in keys {
            if self.store.remove(&key)? {
                removed += 1;
            }
        }
        log::debug!("Removed {} cache entries under '{}'", removed, prefix);
        Ok(removed)
    }

    /// Occupancy across namespaces, stale-but-unread entries included
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let mut stats = CacheStats::default();
        for storage_key in self.store.keys_with_prefix(CACHE_PREFIX)? {
            let Some((namespace, key)) = Self::split_storage_key(&storage_key) else {
                continue;
            };
            let size = self.store.get(&storage_key)?.map(|v| v.len()).unwrap_or(0);
            stats.entry_count += 1;
            stats.total_bytes += size;
            stats
                .keys_by_namespace
                .entry(namespace.to_string())
                .or_default()
                .push(key.to_string());
        }
        Ok(stats)
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

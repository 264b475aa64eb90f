//! Cache Coordinator
//!
//! Bulk inspection and clearing of the namespaces the engine uses. Clearing
//! caches never discards staged edits; those live outside the `cache:` key space
//! and are only removed through the staging ground.

use crate::cache::error::CacheResult;
use crate::cache::store::CacheStore;
use crate::cache::types::CacheStats;

/// Compatible-repository listings per owner (written by the scanner)
pub const REPOSITORIES_NAMESPACE: &str = "repos";
/// Branch listings per repository
pub const BRANCHES_NAMESPACE: &str = "branches";
/// Small miscellaneous values such as scan summaries
pub const MISC_NAMESPACE: &str = "misc";

/// Composes the engine's cache namespaces over one [`CacheStore`]
#[derive(Debug, Clone)]
pub struct CacheCoordinator {
    cache: CacheStore,
}

impl CacheCoordinator {
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }

    /// The underlying store, for components that read and write entries
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Namespaces known to the engine
    pub fn namespaces(&self) -> &'static [&'static str] {
        &[REPOSITORIES_NAMESPACE, BRANCHES_NAMESPACE, MISC_NAMESPACE]
    }

    /// Clear a single namespace, returning the number of removed entries
    pub fn clear(&self, namespace: &str) -> CacheResult<usize> {
        let removed = self.cache.invalidate_namespace(namespace)?;
        log::info!("Cleared {} entries from cache namespace '{}'", removed, namespace);
        Ok(removed)
    }

    /// The user-facing "flush local data" action: every cache namespace, no staging data
    pub fn clear_everything(&self) -> CacheResult<usize> {
        let removed = self.cache.invalidate_all()?;
        log::info!("Cleared {} cache entries across all namespaces", removed);
        Ok(removed)
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        self.cache.stats()
    }
}

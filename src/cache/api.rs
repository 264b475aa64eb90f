//! Public API for the cache system

pub use crate::cache::coordinator::{
    CacheCoordinator, BRANCHES_NAMESPACE, MISC_NAMESPACE, REPOSITORIES_NAMESPACE,
};
pub use crate::cache::error::{CacheError, CacheResult, StorageError, StorageResult};
pub use crate::cache::storage::{FileStore, KeyValueStore, MemoryStore};
pub use crate::cache::store::CacheStore;
pub use crate::cache::types::{CacheEntry, CacheLookup, CacheStats};

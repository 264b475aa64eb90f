//! Cache Component
//!
//! Client-side caching that avoids refetching unchanged remote state:
//!
//! - **KeyValueStore**: durable local medium (in-memory or file-backed)
//! - **CacheStore**: namespaced entries with TTL and lazy staleness eviction
//! - **CacheCoordinator**: bulk inspection and "flush local data" operations

pub mod api;
pub mod coordinator;
pub mod error;
pub mod storage;
pub mod store;
pub mod types;

//! Cached branch listings
//!
//! Branch lists change rarely compared to how often editors ask for them, so
//! they are served from the `branches` cache namespace keyed by `owner/repo`.

use crate::cache::coordinator::BRANCHES_NAMESPACE;
use crate::cache::store::CacheStore;
use crate::cache::types::CacheLookup;
use crate::concurrency::rate_limiter::RateLimiter;
use crate::remote::error::RemoteResult;
use crate::remote::traits::RemoteRepositoryClient;
use crate::remote::types::BranchMeta;
use std::sync::Arc;

pub const DEFAULT_BRANCH_TTL_SECS: u64 = 300;

/// Branch listing service backed by the shared cache
pub struct BranchCatalog {
    client: Arc<dyn RemoteRepositoryClient>,
    cache: CacheStore,
    limiter: Arc<RateLimiter>,
    ttl_seconds: u64,
}

impl BranchCatalog {
    pub fn new(
        client: Arc<dyn RemoteRepositoryClient>,
        cache: CacheStore,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client,
            cache,
            limiter,
            ttl_seconds: DEFAULT_BRANCH_TTL_SECS,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    fn cache_key(owner: &str, repo: &str) -> String {
        format!("{}/{}", owner, repo)
    }

    /// Branches of `owner/repo`, from cache unless `refresh` is set
    pub async fn branches(
        &self,
        owner: &str,
        repo: &str,
        refresh: bool,
    ) -> RemoteResult<Vec<BranchMeta>> {
        let key = Self::cache_key(owner, repo);
        if !refresh {
            let lookup: CacheLookup<Vec<BranchMeta>> = self.cache.get(BRANCHES_NAMESPACE, &key);
            if let Some(branches) = lookup.into_option() {
                log::debug!("Serving {} branches of {} from cache", branches.len(), key);
                return Ok(branches);
            }
        }

        let branches = self
            .limiter
            .execute(|| self.client.get_branches(owner, repo))
            .await?;

        if let Err(e) = self
            .cache
            .set(BRANCHES_NAMESPACE, &key, &branches, self.ttl_seconds)
        {
            log::warn!("Could not cache branches of {}: {}", key, e);
        }
        Ok(branches)
    }

    /// Drop the cached listing of one repository
    pub fn invalidate(&self, owner: &str, repo: &str) -> bool {
        match self
            .cache
            .invalidate(BRANCHES_NAMESPACE, &Self::cache_key(owner, repo))
        {
            Ok(removed) => removed,
            Err(e) => {
                log::warn!("Could not invalidate branch cache: {}", e);
                false
            }
        }
    }
}

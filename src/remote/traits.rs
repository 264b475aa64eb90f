//! Remote repository client contract

use crate::remote::error::RemoteResult;
use crate::remote::types::{BranchMeta, FileUpdate, OwnerType, RemoteFile, RepoMeta, UpdatedFile};
use async_trait::async_trait;

/// Thin contract over the code-hosting API consumed by the scanner and the
/// staging ground. Every call may fail with `NotFound`, `Forbidden`,
/// `RateLimited` or a transport error.
#[async_trait]
pub trait RemoteRepositoryClient: Send + Sync {
    /// List every repository of `owner` (all pages)
    async fn list_repositories(
        &self,
        owner: &str,
        owner_type: OwnerType,
    ) -> RemoteResult<Vec<RepoMeta>>;

    /// Fetch one file and its version fingerprint at `git_ref` (default branch when `None`)
    async fn get_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> RemoteResult<RemoteFile>;

    /// Compare-and-swap write; fails with `Conflict` when the remote fingerprint moved
    async fn update_file(
        &self,
        owner: &str,
        repo: &str,
        update: &FileUpdate,
    ) -> RemoteResult<UpdatedFile>;

    /// List every branch of a repository
    async fn get_branches(&self, owner: &str, repo: &str) -> RemoteResult<Vec<BranchMeta>>;
}

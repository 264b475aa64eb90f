//! Public API for the remote repository client

pub use crate::remote::branches::{BranchCatalog, DEFAULT_BRANCH_TTL_SECS};
pub use crate::remote::error::{RemoteError, RemoteResult};
pub use crate::remote::github::{GitHubClient, DEFAULT_API_URL};
pub use crate::remote::traits::RemoteRepositoryClient;
pub use crate::remote::types::{
    BranchMeta, FileUpdate, OwnerType, RemoteFile, RepoMeta, RepositoryRef, UpdatedFile,
};

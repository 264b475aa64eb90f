//! Remote repository data types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of account owning repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    User,
    Organization,
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerType::User => write!(f, "user"),
            OwnerType::Organization => write!(f, "org"),
        }
    }
}

/// `owner/name` pair identifying one remote repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(format!("'{}' is not of the form owner/repository", s)),
        }
    }
}

/// Repository metadata as listed by the remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoMeta {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    pub private: bool,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub html_url: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl RepoMeta {
    pub fn repository(&self) -> RepositoryRef {
        RepositoryRef::new(&self.owner, &self.name)
    }
}

/// File content together with its version fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub path: String,
    pub content: Vec<u8>,
    /// Opaque version token used for compare-and-swap updates
    pub fingerprint: String,
}

/// Compare-and-swap write of one file
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpdate {
    pub path: String,
    pub content: Vec<u8>,
    /// Fingerprint the remote must still hold; `None` creates a new file
    pub expected_fingerprint: Option<String>,
    pub message: String,
    pub branch: String,
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedFile {
    pub path: String,
    pub new_fingerprint: String,
}

/// Branch metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchMeta {
    pub name: String,
    pub head_sha: String,
    pub protected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_ref_parsing() {
        let repo: RepositoryRef = "WorldHealthOrganization/smart-immunizations".parse().unwrap();
        assert_eq!(repo.owner, "WorldHealthOrganization");
        assert_eq!(repo.name, "smart-immunizations");
        assert_eq!(repo.to_string(), "WorldHealthOrganization/smart-immunizations");

        assert!("no-slash".parse::<RepositoryRef>().is_err());
        assert!("/name".parse::<RepositoryRef>().is_err());
        assert!("owner/".parse::<RepositoryRef>().is_err());
        assert!("a/b/c".parse::<RepositoryRef>().is_err());
    }

    #[test]
    fn test_owner_type_display() {
        assert_eq!(OwnerType::User.to_string(), "user");
        assert_eq!(OwnerType::Organization.to_string(), "org");
    }
}

//! Staging data types

use crate::remote::types::{RepositoryRef, UpdatedFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

pub(crate) const SESSION_KEY_PREFIX: &str = "staging:";

/// Identity of a staging session: one repository and branch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl SessionKey {
    pub fn new(repository: &RepositoryRef, branch: &str) -> Self {
        Self {
            owner: repository.owner.clone(),
            repo: repository.name.clone(),
            branch: branch.to_string(),
        }
    }

    pub fn repository(&self) -> RepositoryRef {
        RepositoryRef::new(&self.owner, &self.repo)
    }

    /// Durable store key, outside the cache key space
    pub fn storage_key(&self) -> String {
        format!("{}{}", SESSION_KEY_PREFIX, self)
    }

    pub(crate) fn from_storage_key(key: &str) -> Option<Self> {
        key.strip_prefix(SESSION_KEY_PREFIX)?.parse().ok()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

impl FromStr for SessionKey {
    type Err = String;

    /// Parse `owner/repo@branch`; the branch may itself contain `/` or `@`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("'{}' is not of the form owner/repo@branch", s);
        let (owner, rest) = s.split_once('/').ok_or_else(invalid)?;
        let (repo, branch) = rest.split_once('@').ok_or_else(invalid)?;
        if owner.is_empty() || repo.is_empty() || branch.is_empty() || repo.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
        })
    }
}

/// One uncommitted edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedFile {
    pub path: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    /// Remote fingerprint the edit was based on; `None` for a new file
    pub base_version: Option<String>,
    pub editor: String,
    pub timestamp: SystemTime,
}

/// Uncommitted edits for one repository and branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingSession {
    pub key: SessionKey,
    /// At most one staged file per path
    pub files: BTreeMap<String, StagedFile>,
    #[serde(default)]
    pub commit_message_draft: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl StagingSession {
    pub fn new(key: SessionKey, now: SystemTime) -> Self {
        Self {
            key,
            files: BTreeMap::new(),
            commit_message_draft: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.files.values().map(|f| f.content.len()).sum()
    }
}

/// Observable lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Empty,
    Dirty,
    Validating,
    Committing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Empty => "empty",
            SessionState::Dirty => "dirty",
            SessionState::Validating => "validating",
            SessionState::Committing => "committing",
        };
        f.write_str(label)
    }
}

/// Outcome of a successful commit
#[derive(Debug, Clone, PartialEq)]
pub struct CommitResult {
    pub session: SessionKey,
    pub message: String,
    pub files: Vec<UpdatedFile>,
}

/// Serde adapter storing bytes as base64 text
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_round_trips_through_storage_key() {
        let key = SessionKey::new(&RepositoryRef::new("who", "smart-hiv"), "feature/dak@v2");
        assert_eq!(key.to_string(), "who/smart-hiv@feature/dak@v2");
        assert_eq!(key.storage_key(), "staging:who/smart-hiv@feature/dak@v2");
        assert_eq!(SessionKey::from_storage_key(&key.storage_key()), Some(key));
    }

    #[test]
    fn test_session_key_rejects_malformed() {
        assert!("who/smart-hiv".parse::<SessionKey>().is_err());
        assert!("who@main".parse::<SessionKey>().is_err());
        assert!("who/@main".parse::<SessionKey>().is_err());
        assert!(SessionKey::from_storage_key("cache:repos:who").is_none());
    }

    #[test]
    fn test_staged_file_content_serialized_as_base64() {
        let file = StagedFile {
            path: "input/fsh/a.fsh".to_string(),
            content: b"Profile: A".to_vec(),
            base_version: None,
            editor: "fsh-editor".to_string(),
            timestamp: SystemTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["content"], "UHJvZmlsZTogQQ==");

        let back: StagedFile = serde_json::from_value(json).unwrap();
        assert_eq!(back, file);
    }
}

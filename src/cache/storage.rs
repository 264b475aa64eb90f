//! Durable Local Key-Value Media
//!
//! The cache and the staging ground persist through a [`KeyValueStore`]. Two media
//! are provided:
//!
//! - [`MemoryStore`]: process-local map, optionally bounded by a byte quota
//! - [`FileStore`]: one record file per key under a data directory, so cached
//!   listings and staged edits survive restarts
//!
//! File names are derived from the SHA-256 of the key (first 16 hex chars); each
//! record carries its original key so prefix listings do not need an index.

use crate::cache::error::{StorageError, StorageResult};
use crate::core::sync::{read_lock, write_lock};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Persisted key-value medium shared by the cache and the staging ground
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Insert or overwrite the value stored under `key`
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Remove `key`; returns whether it was present
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// All keys starting with `prefix`, sorted
    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// In-memory medium
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the total stored value size; writes beyond it fail with `QuotaExceeded`
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let entries = read_lock(&self.entries, StorageError::Lock)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut entries = write_lock(&self.entries, StorageError::Lock)?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if used + value.len() > quota {
                return Err(StorageError::QuotaExceeded { used, quota });
            }
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let mut entries = write_lock(&self.entries, StorageError::Lock)?;
        Ok(entries.remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = read_lock(&self.entries, StorageError::Lock)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// On-disk record layout
#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    key: String,
    /// Base64 of the stored bytes
    value: String,
}

/// Directory-backed medium
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        self.root.join(format!("{}.json", &hex[..16]))
    }

    fn read_record(path: &Path) -> StorageResult<Option<FileRecord>> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.record_path(key);
        match Self::read_record(&path)? {
            // A different key means a truncated-hash collision; treat as absent
            Some(record) if record.key == key => BASE64
                .decode(record.value.as_bytes())
                .map(Some)
                .map_err(|e| StorageError::Corrupt {
                    path,
                    message: e.to_string(),
                }),
            _ => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.record_path(key);
        let record = FileRecord {
            key: key.to_string(),
            value: BASE64.encode(value),
        };
        let json = serde_json::to_vec(&record).map_err(|e| StorageError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;

        // Write-then-rename so readers never observe a half-written record
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|source| StorageError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let path = self.record_path(key);
        match Self::read_record(&path) {
            Ok(Some(record)) if record.key != key => return Ok(false),
            Ok(None) => return Ok(false),
            _ => {}
        }
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| StorageError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(Some(record)) if record.key.starts_with(prefix) => keys.push(record.key),
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unreadable store record: {}", e),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_store(store: &dyn KeyValueStore) {
        assert_eq!(store.get("cache:repos:acme").unwrap(), None);

        store.put("cache:repos:acme", b"first").unwrap();
        store.put("cache:repos:acme", b"second").unwrap();
        store.put("cache:branches:acme/dak", b"main").unwrap();
        store.put("staging:acme/dak@main", b"{}").unwrap();

        assert_eq!(
            store.get("cache:repos:acme").unwrap(),
            Some(b"second".to_vec())
        );
        assert_eq!(
            store.keys_with_prefix("cache:").unwrap(),
            vec![
                "cache:branches:acme/dak".to_string(),
                "cache:repos:acme".to_string()
            ]
        );

        assert!(store.remove("cache:repos:acme").unwrap());
        assert!(!store.remove("cache:repos:acme").unwrap());
        assert_eq!(
            store.keys_with_prefix("staging:").unwrap(),
            vec!["staging:acme/dak@main".to_string()]
        );
    }

    #[test]
    fn test_memory_store_operations() {
        exercise_store(&MemoryStore::new());
    }

    #[test]
    fn test_file_store_operations() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("store")).unwrap();
        exercise_store(&store);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put("staging:who/smart@main", &[0, 159, 146, 150]).unwrap();
        }

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get("staging:who/smart@main").unwrap(),
            Some(vec![0, 159, 146, 150])
        );
    }

    #[test]
    fn test_file_store_skips_corrupt_records_when_listing() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put("cache:misc:a", b"1").unwrap();
        std::fs::write(dir.path().join("garbage.json"), b"not json").unwrap();

        assert_eq!(
            store.keys_with_prefix("cache:").unwrap(),
            vec!["cache:misc:a".to_string()]
        );
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(8);
        store.put("a", b"12345").unwrap();
        // Overwriting the same key does not double count
        store.put("a", b"123456").unwrap();

        let err = store.put("b", b"123").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { used: 6, quota: 8 }));
    }
}

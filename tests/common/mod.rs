//! Common test utilities and helpers
//!
//! [`FakeRemote`] is an in-memory code-hosting API with call counters and
//! injectable failures, shared by the scanner, staging and cache tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dak_engine::cache::api::{CacheStore, KeyValueStore, MemoryStore};
use dak_engine::concurrency::api::RateLimiter;
use dak_engine::core::time::SystemTimeProvider;
use dak_engine::remote::api::{
    BranchMeta, FileUpdate, OwnerType, RemoteError, RemoteFile, RemoteRepositoryClient,
    RemoteResult, RepoMeta, UpdatedFile,
};
use dak_engine::scanner::api::{RepositoryScanner, ScannerConfig};
use dak_engine::staging::api::{BasicContentValidator, StagingGround};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Marker file content declaring the base DAK dependency
pub const COMPATIBLE_MARKER: &str = "\
id: smart.who.int.demo
dependencies:
  hl7.fhir.uv.extensions: current
  smart.who.int.base: current
";

#[derive(Default)]
pub struct FakeRemote {
    repos: Mutex<HashMap<String, Vec<RepoMeta>>>,
    files: Mutex<HashMap<String, RemoteFile>>,
    branches: Mutex<HashMap<String, Vec<BranchMeta>>>,
    slow_repos: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    listing_error: Mutex<Option<RemoteError>>,
    fingerprints: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub get_file_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub branch_calls: AtomicUsize,
}

fn file_key(owner: &str, repo: &str, path: &str) -> String {
    format!("{}/{}:{}", owner, repo, path)
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_repo(&self, owner: &str, name: &str) {
        self.repos
            .lock()
            .unwrap()
            .entry(owner.to_string())
            .or_default()
            .push(RepoMeta {
                owner: owner.to_string(),
                name: name.to_string(),
                default_branch: "main".to_string(),
                private: false,
                description: Some(format!("{} repository", name)),
                stars: 1,
                forks: 0,
                html_url: Some(format!("https://github.com/{}/{}", owner, name)),
                updated_at: None,
                topics: Vec::new(),
            });
    }

    /// Create or overwrite a remote file; returns its new fingerprint
    pub fn put_file(&self, owner: &str, repo: &str, path: &str, content: &str) -> String {
        let fingerprint = format!("fp-{}", self.fingerprints.fetch_add(1, Ordering::SeqCst) + 1);
        self.files.lock().unwrap().insert(
            file_key(owner, repo, path),
            RemoteFile {
                path: path.to_string(),
                content: content.as_bytes().to_vec(),
                fingerprint: fingerprint.clone(),
            },
        );
        fingerprint
    }

    pub fn delete_file(&self, owner: &str, repo: &str, path: &str) {
        self.files.lock().unwrap().remove(&file_key(owner, repo, path));
    }

    pub fn file(&self, owner: &str, repo: &str, path: &str) -> Option<RemoteFile> {
        self.files
            .lock()
            .unwrap()
            .get(&file_key(owner, repo, path))
            .cloned()
    }

    pub fn set_branches(&self, owner: &str, repo: &str, names: &[&str]) {
        let branches = names
            .iter()
            .map(|name| BranchMeta {
                name: name.to_string(),
                head_sha: format!("{:0>40}", name.len()),
                protected: *name == "main",
            })
            .collect();
        self.branches
            .lock()
            .unwrap()
            .insert(format!("{}/{}", owner, repo), branches);
    }

    /// File reads of this repository never answer
    pub fn make_slow(&self, owner: &str, repo: &str) {
        self.slow_repos
            .lock()
            .unwrap()
            .insert(format!("{}/{}", owner, repo));
    }

    /// Writes to `path` fail with a transport error
    pub fn fail_writes_to(&self, path: &str) {
        self.failing_writes.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_listing(&self, error: RemoteError) {
        *self.listing_error.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
            + self.get_file_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.branch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteRepositoryClient for FakeRemote {
    async fn list_repositories(
        &self,
        owner: &str,
        _owner_type: OwnerType,
    ) -> RemoteResult<Vec<RepoMeta>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.listing_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self
            .repos
            .lock()
            .unwrap()
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        _git_ref: Option<&str>,
    ) -> RemoteResult<RemoteFile> {
        self.get_file_calls.fetch_add(1, Ordering::SeqCst);
        let slow = self
            .slow_repos
            .lock()
            .unwrap()
            .contains(&format!("{}/{}", owner, repo));
        if slow {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.file(owner, repo, path).ok_or_else(|| RemoteError::NotFound {
            resource: file_key(owner, repo, path),
        })
    }

    async fn update_file(
        &self,
        owner: &str,
        repo: &str,
        update: &FileUpdate,
    ) -> RemoteResult<UpdatedFile> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_writes.lock().unwrap().contains(&update.path) {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }

        let actual = self
            .file(owner, repo, &update.path)
            .map(|f| f.fingerprint);
        if actual != update.expected_fingerprint {
            return Err(RemoteError::Conflict {
                path: update.path.clone(),
                expected: update.expected_fingerprint.clone(),
                actual,
            });
        }

        let content = String::from_utf8_lossy(&update.content).to_string();
        let new_fingerprint = self.put_file(owner, repo, &update.path, &content);
        Ok(UpdatedFile {
            path: update.path.clone(),
            new_fingerprint,
        })
    }

    async fn get_branches(&self, owner: &str, repo: &str) -> RemoteResult<Vec<BranchMeta>> {
        self.branch_calls.fetch_add(1, Ordering::SeqCst);
        self.branches
            .lock()
            .unwrap()
            .get(&format!("{}/{}", owner, repo))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                resource: format!("{}/{}", owner, repo),
            })
    }
}

pub fn memory_store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

pub fn cache_over(store: &Arc<dyn KeyValueStore>) -> CacheStore {
    CacheStore::new(store.clone(), Arc::new(SystemTimeProvider))
}

pub fn limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(1000))
}

pub fn scanner(remote: &Arc<FakeRemote>, store: &Arc<dyn KeyValueStore>) -> RepositoryScanner {
    RepositoryScanner::new(
        remote.clone(),
        cache_over(store),
        limiter(),
        ScannerConfig::default(),
    )
    .expect("default scanner configuration is valid")
}

pub fn staging(remote: &Arc<FakeRemote>, store: &Arc<dyn KeyValueStore>) -> StagingGround {
    StagingGround::new(
        remote.clone(),
        store.clone(),
        limiter(),
        Arc::new(BasicContentValidator),
    )
}

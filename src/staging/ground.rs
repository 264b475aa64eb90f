//! Staging Ground
//!
//! Accumulates uncommitted edits per (repository, branch) and commits them to
//! the remote with optimistic concurrency. Each session has its own async lock:
//! staging calls hold it briefly, while commit holds it for the whole pre-flight
//! and write sequence so no edit can slip into a half-committed file set.
//!
//! Sessions are persisted to the durable store after every mutation under
//! `staging:<owner>/<repo>@<branch>` and are loaded back lazily on first access.

use crate::cache::storage::KeyValueStore;
use crate::concurrency::rate_limiter::RateLimiter;
use crate::core::sync::lock_mutex;
use crate::core::time::{SystemTimeProvider, TimeProvider};
use crate::remote::error::RemoteError;
use crate::remote::traits::RemoteRepositoryClient;
use crate::remote::types::{FileUpdate, RemoteFile, RepositoryRef, UpdatedFile};
use crate::staging::error::{StagingError, StagingResult};
use crate::staging::types::{
    CommitResult, SessionKey, SessionState, StagedFile, StagingSession, SESSION_KEY_PREFIX,
};
use crate::staging::validation::{ContentValidator, FormatHint, Issue, ValidationResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const IDLE: u8 = 0;
const VALIDATING: u8 = 1;
const COMMITTING: u8 = 2;

/// In-memory slot for one session
struct SessionSlot {
    session: tokio::sync::Mutex<Option<StagingSession>>,
    activity: AtomicU8,
    file_count: AtomicUsize,
}

impl SessionSlot {
    fn new(session: Option<StagingSession>) -> Self {
        let file_count = session.as_ref().map(StagingSession::file_count).unwrap_or(0);
        Self {
            session: tokio::sync::Mutex::new(session),
            activity: AtomicU8::new(IDLE),
            file_count: AtomicUsize::new(file_count),
        }
    }

    fn state(&self) -> SessionState {
        match self.activity.load(Ordering::Acquire) {
            VALIDATING => SessionState::Validating,
            COMMITTING => SessionState::Committing,
            _ if self.file_count.load(Ordering::Acquire) > 0 => SessionState::Dirty,
            _ => SessionState::Empty,
        }
    }

    /// Mark the slot busy until the returned guard is dropped
    fn begin(&self, activity: u8) -> ActivityGuard<'_> {
        self.activity.store(activity, Ordering::Release);
        ActivityGuard { slot: self }
    }
}

struct ActivityGuard<'a> {
    slot: &'a SessionSlot,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.slot.activity.store(IDLE, Ordering::Release);
    }
}

/// Per-repository-and-branch accumulator of uncommitted edits
pub struct StagingGround {
    client: Arc<dyn RemoteRepositoryClient>,
    store: Arc<dyn KeyValueStore>,
    limiter: Arc<RateLimiter>,
    validator: Arc<dyn ContentValidator>,
    clock: Arc<dyn TimeProvider>,
    slots: Mutex<HashMap<SessionKey, Arc<SessionSlot>>>,
}

impl StagingGround {
    pub fn new(
        client: Arc<dyn RemoteRepositoryClient>,
        store: Arc<dyn KeyValueStore>,
        limiter: Arc<RateLimiter>,
        validator: Arc<dyn ContentValidator>,
    ) -> Self {
        Self {
            client,
            store,
            limiter,
            validator,
            clock: Arc::new(SystemTimeProvider),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    /// Slot for `key`, loading a persisted session on first access
    fn slot(&self, key: &SessionKey) -> StagingResult<Arc<SessionSlot>> {
        let mut slots = lock_mutex(&self.slots, StagingError::Storage)?;
        if let Some(slot) = slots.get(key) {
            return Ok(Arc::clone(slot));
        }
        let persisted = self.load(key)?;
        let slot = Arc::new(SessionSlot::new(persisted));
        slots.insert(key.clone(), Arc::clone(&slot));
        Ok(slot)
    }

    /// Persisted session for `key`; an undecodable record reads as no session
    /// so it can be discarded or overwritten
    fn load(&self, key: &SessionKey) -> StagingResult<Option<StagingSession>> {
        let Some(raw) = self.store.get(&key.storage_key())? else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                log::warn!("Ignoring unreadable staging session {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Forget the slot once its session is gone and no other caller holds it
    fn release(&self, key: &SessionKey, slot: &Arc<SessionSlot>) {
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };
        let idle = Arc::strong_count(slot) == 2
            && slot
                .session
                .try_lock()
                .map(|session| session.is_none())
                .unwrap_or(false);
        if idle && slots.get(key).is_some_and(|held| Arc::ptr_eq(held, slot)) {
            slots.remove(key);
        }
    }

    /// Write the session through to the durable store, or remove it when empty
    fn persist(
        &self,
        slot: &SessionSlot,
        key: &SessionKey,
        session: &Option<StagingSession>,
    ) -> StagingResult<()> {
        match session {
            Some(session) if !session.is_empty() => {
                let raw = serde_json::to_vec(session)?;
                self.store.put(&key.storage_key(), &raw)?;
                slot.file_count.store(session.file_count(), Ordering::Release);
            }
            _ => {
                self.store.remove(&key.storage_key())?;
                slot.file_count.store(0, Ordering::Release);
            }
        }
        Ok(())
    }

    /// Insert or replace the staged file at `path`, creating the session if absent
    pub async fn stage_file(
        &self,
        repository: &RepositoryRef,
        branch: &str,
        path: &str,
        content: Vec<u8>,
        base_version: Option<String>,
        editor: &str,
    ) -> StagingResult<()> {
        let path = normalize_path(path)?;
        let key = SessionKey::new(repository, branch);
        let slot = self.slot(&key)?;
        let mut guard = slot.session.lock().await;

        let now = self.clock.system_time();
        let mut updated = guard
            .clone()
            .unwrap_or_else(|| StagingSession::new(key.clone(), now));
        let replaced = updated
            .files
            .insert(
                path.clone(),
                StagedFile {
                    path: path.clone(),
                    content,
                    base_version,
                    editor: editor.to_string(),
                    timestamp: now,
                },
            )
            .is_some();
        updated.updated_at = now;

        let updated = Some(updated);
        self.persist(&slot, &key, &updated)?;
        *guard = updated;
        log::debug!(
            "{} {} in {} (editor {})",
            if replaced { "Restaged" } else { "Staged" },
            path,
            key,
            editor
        );
        Ok(())
    }

    /// Remove one staged file; returns whether it was staged
    pub async fn remove_file(
        &self,
        repository: &RepositoryRef,
        branch: &str,
        path: &str,
    ) -> StagingResult<bool> {
        let path = normalize_path(path)?;
        let key = SessionKey::new(repository, branch);
        let slot = self.slot(&key)?;
        let mut guard = slot.session.lock().await;

        let Some(mut updated) = guard.clone() else {
            return Ok(false);
        };
        if updated.files.remove(&path).is_none() {
            return Ok(false);
        }
        updated.updated_at = self.clock.system_time();

        let updated = (!updated.is_empty()).then_some(updated);
        self.persist(&slot, &key, &updated)?;
        *guard = updated;
        drop(guard);
        self.release(&key, &slot);
        log::debug!("Unstaged {} from {}", path, key);
        Ok(true)
    }

    /// Destroy the session; returns the number of discarded files
    pub async fn discard_all(&self, repository: &RepositoryRef, branch: &str) -> StagingResult<usize> {
        let key = SessionKey::new(repository, branch);
        let slot = self.slot(&key)?;
        let mut guard = slot.session.lock().await;

        let discarded = guard.as_ref().map(StagingSession::file_count).unwrap_or(0);
        self.persist(&slot, &key, &None)?;
        *guard = None;
        drop(guard);
        self.release(&key, &slot);
        if discarded > 0 {
            log::info!("Discarded {} staged file(s) from {}", discarded, key);
        }
        Ok(discarded)
    }

    /// Store a draft commit message for an existing session
    pub async fn set_commit_message(
        &self,
        repository: &RepositoryRef,
        branch: &str,
        draft: &str,
    ) -> StagingResult<bool> {
        let key = SessionKey::new(repository, branch);
        let slot = self.slot(&key)?;
        let mut guard = slot.session.lock().await;

        let Some(mut updated) = guard.clone() else {
            return Ok(false);
        };
        updated.commit_message_draft = draft.to_string();
        updated.updated_at = self.clock.system_time();
        let updated = Some(updated);
        self.persist(&slot, &key, &updated)?;
        *guard = updated;
        Ok(true)
    }

    /// Snapshot of the session, if one exists
    pub async fn session(
        &self,
        repository: &RepositoryRef,
        branch: &str,
    ) -> StagingResult<Option<StagingSession>> {
        let key = SessionKey::new(repository, branch);
        let slot = self.slot(&key)?;
        let snapshot = slot.session.lock().await.clone();
        if snapshot.is_none() {
            self.release(&key, &slot);
        }
        Ok(snapshot)
    }

    /// Current lifecycle state; does not wait for a running commit
    pub fn state(&self, repository: &RepositoryRef, branch: &str) -> StagingResult<SessionState> {
        let key = SessionKey::new(repository, branch);
        let slot = self.slot(&key)?;
        let state = slot.state();
        if state == SessionState::Empty {
            self.release(&key, &slot);
        }
        Ok(state)
    }

    /// Every session with staged files, from the durable store
    pub fn sessions(&self) -> StagingResult<Vec<SessionKey>> {
        let keys = self.store.keys_with_prefix(SESSION_KEY_PREFIX)?;
        Ok(keys
            .iter()
            .filter_map(|k| SessionKey::from_storage_key(k))
            .collect())
    }

    /// Load every persisted session into memory; returns how many were loaded.
    ///
    /// Unreadable records are skipped and logged.
    pub fn restore(&self) -> StagingResult<usize> {
        let mut restored = 0;
        for key in self.sessions()? {
            let mut slots = lock_mutex(&self.slots, StagingError::Storage)?;
            if slots.contains_key(&key) {
                continue;
            }
            match self.load(&key) {
                Ok(session) => {
                    restored += usize::from(session.is_some());
                    slots.insert(key, Arc::new(SessionSlot::new(session)));
                }
                Err(e) => log::warn!("Skipping unreadable staging session {}: {}", key, e),
            }
        }
        if restored > 0 {
            log::info!("Restored {} staging session(s)", restored);
        }
        Ok(restored)
    }

    /// Check every staged file, including against its prior remote version
    pub async fn validate(
        &self,
        repository: &RepositoryRef,
        branch: &str,
    ) -> StagingResult<ValidationResult> {
        let key = SessionKey::new(repository, branch);
        let slot = self.slot(&key)?;
        let snapshot = slot.session.lock().await.clone();

        let Some(session) = snapshot else {
            self.release(&key, &slot);
            return Ok(ValidationResult::default());
        };
        let _busy = slot.begin(VALIDATING);
        Ok(self.run_validation(&session).await)
    }

    async fn run_validation(&self, session: &StagingSession) -> ValidationResult {
        let mut issues = Vec::new();
        for file in session.files.values() {
            issues.extend(self.validator.validate(
                &file.path,
                &file.content,
                FormatHint::from_path(&file.path),
            ));
            if let Some(base) = &file.base_version {
                issues.extend(self.check_prior_version(&session.key, file, base).await);
            }
        }
        let result = ValidationResult::from_issues(issues);
        log::debug!(
            "Validated {}: {} error(s), {} warning(s), {} info",
            session.key,
            result.error_count,
            result.warning_count,
            result.info_count
        );
        result
    }

    async fn check_prior_version(
        &self,
        key: &SessionKey,
        file: &StagedFile,
        base: &str,
    ) -> Option<Issue> {
        match self.fetch_remote(key, &file.path).await {
            Ok(remote) if remote.fingerprint != base => Some(Issue::info(
                &file.path,
                "changed remotely since staging; re-sync before committing",
            )),
            Ok(remote) if remote.content == file.content => {
                Some(Issue::info(&file.path, "no changes compared to the remote version"))
            }
            Ok(_) => None,
            Err(e) if e.is_not_found() => {
                Some(Issue::info(&file.path, "deleted remotely since staging"))
            }
            Err(e) => Some(Issue::warning(
                &file.path,
                format!("could not fetch the remote version: {}", e),
            )),
        }
    }

    async fn fetch_remote(&self, key: &SessionKey, path: &str) -> Result<RemoteFile, RemoteError> {
        self.limiter
            .execute(|| {
                self.client
                    .get_file(&key.owner, &key.repo, path, Some(key.branch.as_str()))
            })
            .await
    }

    /// Validate, pre-flight every fingerprint, then write all staged files.
    ///
    /// Nothing is written unless every file passes the pre-flight check. On
    /// success the session is cleared; on failure it is retained for a retry.
    pub async fn commit(
        &self,
        repository: &RepositoryRef,
        branch: &str,
        message: Option<&str>,
        allow_with_warnings: bool,
    ) -> StagingResult<CommitResult> {
        let key = SessionKey::new(repository, branch);
        let slot = self.slot(&key)?;
        let mut guard = slot.session.lock().await;

        let session = match guard.as_ref() {
            Some(session) if !session.is_empty() => session.clone(),
            _ => {
                return Err(StagingError::NothingToCommit {
                    session: key.to_string(),
                })
            }
        };

        let validation = {
            let _validating = slot.begin(VALIDATING);
            self.run_validation(&session).await
        };
        if validation.blocks_commit(allow_with_warnings) {
            log::info!(
                "Commit of {} blocked: {} error(s), {} warning(s)",
                key,
                validation.error_count,
                validation.warning_count
            );
            return Err(StagingError::ValidationBlocked(validation));
        }

        let _committing = slot.begin(COMMITTING);
        self.preflight(&key, &session).await?;

        let message = commit_message(message, &session);
        let mut written: Vec<UpdatedFile> = Vec::new();
        for file in session.files.values() {
            let update = FileUpdate {
                path: file.path.clone(),
                content: file.content.clone(),
                expected_fingerprint: file.base_version.clone(),
                message: message.clone(),
                branch: key.branch.clone(),
            };
            let result = self
                .limiter
                .execute(|| self.client.update_file(&key.owner, &key.repo, &update))
                .await;

            match result {
                Ok(updated) => {
                    log::debug!("Wrote {} to {}", file.path, key);
                    written.push(updated);
                }
                Err(source) if written.is_empty() => {
                    return Err(match source {
                        RemoteError::Conflict { path, .. } => StagingError::Conflict {
                            session: key.to_string(),
                            paths: vec![path],
                        },
                        other => StagingError::Remote(other),
                    });
                }
                Err(source) => {
                    return Err(self.partial_commit(
                        &slot,
                        &key,
                        &mut guard,
                        &session,
                        written,
                        &file.path,
                        source,
                    ));
                }
            }
        }

        self.persist(&slot, &key, &None)?;
        *guard = None;
        drop(guard);
        self.release(&key, &slot);
        log::info!("Committed {} file(s) to {}: {}", written.len(), key, message);
        Ok(CommitResult {
            session: key,
            message,
            files: written,
        })
    }

    /// Compare every staged base version with the remote before any write
    async fn preflight(&self, key: &SessionKey, session: &StagingSession) -> StagingResult<()> {
        let mut conflicts = Vec::new();
        for file in session.files.values() {
            match (self.fetch_remote(key, &file.path).await, &file.base_version) {
                (Ok(remote), Some(base)) if remote.fingerprint == *base => {}
                (Err(e), None) if e.is_not_found() => {}
                (Ok(_), _) => conflicts.push(file.path.clone()),
                (Err(e), Some(_)) if e.is_not_found() => conflicts.push(file.path.clone()),
                (Err(e), _) => return Err(StagingError::Remote(e)),
            }
        }

        if conflicts.is_empty() {
            return Ok(());
        }
        log::warn!(
            "Commit of {} refused, remote moved for: {}",
            key,
            conflicts.join(", ")
        );
        Err(StagingError::Conflict {
            session: key.to_string(),
            paths: conflicts,
        })
    }

    /// Drop the files already written from the session and report the failure
    #[allow(clippy::too_many_arguments)]
    fn partial_commit(
        &self,
        slot: &SessionSlot,
        key: &SessionKey,
        guard: &mut Option<StagingSession>,
        session: &StagingSession,
        written: Vec<UpdatedFile>,
        failed_path: &str,
        source: RemoteError,
    ) -> StagingError {
        let mut remaining = session.clone();
        for file in &written {
            remaining.files.remove(&file.path);
        }
        remaining.updated_at = self.clock.system_time();
        let remaining = (!remaining.is_empty()).then_some(remaining);
        if let Err(e) = self.persist(slot, key, &remaining) {
            log::warn!("Could not persist {} after partial commit: {}", key, e);
        }
        *guard = remaining;

        let written: Vec<String> = written.into_iter().map(|f| f.path).collect();
        log::error!(
            "Commit of {} failed at {} after writing {}",
            key,
            failed_path,
            written.join(", ")
        );
        StagingError::PartialCommit {
            session: key.to_string(),
            written,
            failed_path: failed_path.to_string(),
            source,
        }
    }
}

fn commit_message(explicit: Option<&str>, session: &StagingSession) -> String {
    explicit
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .or_else(|| Some(session.commit_message_draft.trim()).filter(|m| !m.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Update {} file(s) via DAK staging", session.file_count()))
}

/// Repository-relative path without leading slashes or parent references
fn normalize_path(path: &str) -> StagingResult<String> {
    let trimmed = path.trim().trim_start_matches('/');
    let invalid = |reason: &str| StagingError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if trimmed.is_empty() || trimmed.ends_with('/') {
        return Err(invalid("must name a file"));
    }
    if trimmed.split('/').any(|segment| segment == ".." || segment.is_empty()) {
        return Err(invalid("must not contain empty or '..' segments"));
    }
    Ok(trimmed.to_string())
}

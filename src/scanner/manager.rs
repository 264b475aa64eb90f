//! Repository Scanner
//!
//! Progressive discovery of DAK-compatible repositories for one owner. The
//! owner's repositories are listed once, then each is probed for the marker
//! file through the bounded task runner and the shared rate limiter. Results
//! stream back through `on_found` as probes resolve and every state change is
//! reported through `on_progress`.
//!
//! Only completed, uncancelled scans populate the `repos` cache namespace, so a
//! partial listing is never served as complete.

use crate::cache::coordinator::{MISC_NAMESPACE, REPOSITORIES_NAMESPACE};
use crate::cache::store::CacheStore;
use crate::cache::types::CacheLookup;
use crate::concurrency::rate_limiter::RateLimiter;
use crate::concurrency::runner::{ConcurrentTaskRunner, TaskOutcome};
use crate::core::cancel::CancelToken;
use crate::core::retry::{retry_async_if, RetryPolicy};
use crate::core::time::{SystemTimeProvider, TimeProvider};
use crate::remote::error::RemoteError;
use crate::remote::traits::RemoteRepositoryClient;
use crate::remote::types::{OwnerType, RepoMeta};
use crate::scanner::error::{ScanError, ScanResult};
use crate::scanner::probe::CompatibilityRule;
use crate::scanner::types::{
    ProbeFailure, ProbeOutcome, RepositoryCandidate, ScanPhase, ScanProgress, ScanReport,
    ScanSummary,
};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PROBE_CONCURRENCY: usize = 5;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SCAN_TTL_SECS: u64 = 300;

/// Scanner tuning
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub probe_concurrency: usize,
    /// Applied to each probe's remote call, not to its wait for a rate slot
    pub probe_timeout: Duration,
    pub cache_ttl_secs: u64,
    pub rule: CompatibilityRule,
    pub listing_retry: RetryPolicy,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            cache_ttl_secs: DEFAULT_SCAN_TTL_SECS,
            rule: CompatibilityRule::default(),
            listing_retry: RetryPolicy::default(),
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> ScanResult<()> {
        if self.probe_concurrency == 0 {
            return Err(ScanError::Configuration {
                message: "probe concurrency must be at least 1".to_string(),
            });
        }
        if self.rule.marker_path.trim().is_empty() {
            return Err(ScanError::Configuration {
                message: "marker path cannot be empty".to_string(),
            });
        }
        if self.rule.required_identifier.trim().is_empty() {
            return Err(ScanError::Configuration {
                message: "required identifier cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Discovers compatible repositories per owner
pub struct RepositoryScanner {
    client: Arc<dyn RemoteRepositoryClient>,
    cache: CacheStore,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn TimeProvider>,
    config: ScannerConfig,
}

impl RepositoryScanner {
    pub fn new(
        client: Arc<dyn RemoteRepositoryClient>,
        cache: CacheStore,
        limiter: Arc<RateLimiter>,
        config: ScannerConfig,
    ) -> ScanResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            cache,
            limiter,
            clock: Arc::new(SystemTimeProvider),
            config,
        })
    }

    /// Use a specific clock for summary timestamps
    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scan `owner` and return the compatible candidates
    pub async fn scan<F, P>(
        &self,
        owner: &str,
        owner_type: OwnerType,
        on_found: F,
        on_progress: P,
        cancel: &CancelToken,
    ) -> ScanResult<Vec<RepositoryCandidate>>
    where
        F: Fn(RepositoryCandidate) + Send + Sync,
        P: Fn(ScanProgress) + Send + Sync,
    {
        let report = self
            .scan_with_report(owner, owner_type, on_found, on_progress, cancel)
            .await?;
        Ok(report.candidates)
    }

    /// Scan `owner`, returning the full report including per-repository failures
    pub async fn scan_with_report<F, P>(
        &self,
        owner: &str,
        owner_type: OwnerType,
        on_found: F,
        on_progress: P,
        cancel: &CancelToken,
    ) -> ScanResult<ScanReport>
    where
        F: Fn(RepositoryCandidate) + Send + Sync,
        P: Fn(ScanProgress) + Send + Sync,
    {
        if let Some(report) = self.replay_cached(owner, &on_found, &on_progress) {
            return Ok(report);
        }

        on_progress(ScanProgress::new(0, 0, "", ScanPhase::Started));
        let repositories = self.list_repositories(owner, owner_type).await?;
        let total = repositories.len();
        log::info!("Scanning {} repositories of {} '{}'", total, owner_type, owner);
        on_progress(ScanProgress::new(0, total, "", ScanPhase::Running));

        let scanned = AtomicUsize::new(0);
        let (scanned_ref, on_found_ref, on_progress_ref) = (&scanned, &on_found, &on_progress);

        let runner = ConcurrentTaskRunner::new(self.config.probe_concurrency);
        let outcomes = runner
            .run_all(
                repositories,
                move |meta: RepoMeta| async move {
                    let outcome = self.probe(&meta).await;
                    let done = scanned_ref.fetch_add(1, Ordering::AcqRel) + 1;
                    let candidate = RepositoryCandidate::from_meta(&meta, outcome.is_compatible());
                    if candidate.compatible {
                        on_found_ref(candidate.clone());
                    }
                    on_progress_ref(ScanProgress::new(done, total, &meta.name, ScanPhase::Running));
                    Ok::<_, Infallible>((candidate, outcome))
                },
                cancel,
            )
            .await;

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = 0usize;
        let mut last_name = String::new();
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Completed((candidate, probe)) => {
                    last_name = candidate.name.clone();
                    if let ProbeOutcome::Failed(reason) = probe {
                        failures.push(ProbeFailure {
                            repository: candidate.full_name(),
                            reason,
                        });
                    }
                    if candidate.compatible {
                        candidates.push(candidate);
                    }
                }
                TaskOutcome::Failed(never) => match never {},
                TaskOutcome::Skipped => skipped += 1,
            }
        }

        let scanned = scanned.into_inner();
        let cancelled = cancel.is_cancelled() || skipped > 0;
        let report = ScanReport {
            owner: owner.to_string(),
            candidates,
            failures,
            scanned,
            total,
            cancelled,
            from_cache: false,
        };

        if cancelled {
            log::info!(
                "Scan of '{}' cancelled after {}/{} repositories; results not cached",
                owner,
                scanned,
                total
            );
            on_progress(ScanProgress::new(scanned, total, &last_name, ScanPhase::Cancelled));
        } else {
            self.store_results(&report);
            log::info!(
                "Scan of '{}' completed: {} compatible, {} failed, {} scanned",
                owner,
                report.candidates.len(),
                report.failures.len(),
                scanned
            );
            on_progress(ScanProgress::new(scanned, total, &last_name, ScanPhase::Completed));
        }

        Ok(report)
    }

    /// Replay a fresh cached listing without remote calls
    fn replay_cached<F, P>(&self, owner: &str, on_found: &F, on_progress: &P) -> Option<ScanReport>
    where
        F: Fn(RepositoryCandidate),
        P: Fn(ScanProgress),
    {
        let lookup: CacheLookup<Vec<RepositoryCandidate>> =
            self.cache.get(REPOSITORIES_NAMESPACE, owner);
        let candidates = lookup.into_option()?;
        log::debug!(
            "Replaying {} cached candidates for '{}'",
            candidates.len(),
            owner
        );

        for candidate in &candidates {
            on_found(candidate.clone());
        }
        let count = candidates.len();
        let last_name = candidates.last().map(|c| c.name.as_str()).unwrap_or("");
        on_progress(ScanProgress::new(count, count, last_name, ScanPhase::Completed));

        Some(ScanReport {
            owner: owner.to_string(),
            candidates,
            failures: Vec::new(),
            scanned: count,
            total: count,
            cancelled: false,
            from_cache: true,
        })
    }

    async fn list_repositories(
        &self,
        owner: &str,
        owner_type: OwnerType,
    ) -> ScanResult<Vec<RepoMeta>> {
        retry_async_if(
            "list_repositories",
            self.config.listing_retry.clone(),
            RemoteError::is_transient,
            || self.client.list_repositories(owner, owner_type),
        )
        .await
        .map_err(|source| {
            log::warn!("Listing repositories of '{}' failed: {}", owner, source);
            ScanError::Listing {
                owner: owner.to_string(),
                source,
            }
        })
    }

    /// Fetch and inspect the marker file of one repository
    async fn probe(&self, meta: &RepoMeta) -> ProbeOutcome {
        let rule = &self.config.rule;
        let timeout = self.config.probe_timeout;
        let fetched = self
            .limiter
            .execute(|| {
                tokio::time::timeout(
                    timeout,
                    self.client.get_file(
                        &meta.owner,
                        &meta.name,
                        &rule.marker_path,
                        Some(meta.default_branch.as_str()),
                    ),
                )
            })
            .await;

        match fetched {
            Ok(Ok(file)) if rule.matches(&file.content) => {
                log::debug!("{}/{} is compatible", meta.owner, meta.name);
                ProbeOutcome::Compatible
            }
            Ok(Ok(_)) => {
                log::debug!(
                    "{}/{}: {} does not declare {}",
                    meta.owner,
                    meta.name,
                    rule.marker_path,
                    rule.required_identifier
                );
                ProbeOutcome::Incompatible
            }
            Ok(Err(e)) if e.is_not_found() => {
                log::debug!("{}/{}: no {}", meta.owner, meta.name, rule.marker_path);
                ProbeOutcome::Incompatible
            }
            Ok(Err(e)) => {
                log::warn!("Probe of {}/{} failed: {}", meta.owner, meta.name, e);
                ProbeOutcome::Failed(e.to_string())
            }
            Err(_) => {
                log::warn!(
                    "Probe of {}/{} timed out after {:?}",
                    meta.owner,
                    meta.name,
                    timeout
                );
                ProbeOutcome::Failed(format!("timed out after {:?}", timeout))
            }
        }
    }

    fn store_results(&self, report: &ScanReport) {
        if let Err(e) = self.cache.set(
            REPOSITORIES_NAMESPACE,
            &report.owner,
            &report.candidates,
            self.config.cache_ttl_secs,
        ) {
            log::warn!("Could not cache scan results for '{}': {}", report.owner, e);
        }

        let summary = ScanSummary {
            owner: report.owner.clone(),
            scanned: report.scanned,
            compatible: report.candidates.len(),
            failed: report.failures.len(),
            completed_at: self.clock.system_time(),
        };
        if let Err(e) = self.cache.set(
            MISC_NAMESPACE,
            &summary_key(&report.owner),
            &summary,
            self.config.cache_ttl_secs,
        ) {
            log::warn!("Could not cache scan summary for '{}': {}", report.owner, e);
        }
    }

    /// Summary of the last completed scan of `owner`, while still fresh
    pub fn last_summary(&self, owner: &str) -> Option<ScanSummary> {
        self.cache
            .get::<ScanSummary>(MISC_NAMESPACE, &summary_key(owner))
            .into_option()
    }

    /// Drop the cached listing and summary for `owner`
    pub fn invalidate(&self, owner: &str) -> bool {
        let summary_removed = self
            .cache
            .invalidate(MISC_NAMESPACE, &summary_key(owner))
            .unwrap_or(false);
        match self.cache.invalidate(REPOSITORIES_NAMESPACE, owner) {
            Ok(removed) => removed || summary_removed,
            Err(e) => {
                log::warn!("Could not invalidate scan cache for '{}': {}", owner, e);
                summary_removed
            }
        }
    }
}

fn summary_key(owner: &str) -> String {
    format!("scan-summary:{}", owner)
}

//! Command handlers
//!
//! Wires the engine components from [`Settings`] and renders their results on
//! the terminal. All engine logic lives in the library modules; this layer only
//! parses inputs and prints outputs.

use crate::app::cli::args::{CacheCommand, Command, SessionArgs, StageCommand};
use crate::app::cli::config::{ConfigError, Settings};
use crate::cache::api::{
    CacheCoordinator, CacheError, CacheStore, FileStore, KeyValueStore, MemoryStore, StorageError,
};
use crate::concurrency::api::RateLimiter;
use crate::core::cancel::CancelToken;
use crate::core::error_handling::ContextualError;
use crate::core::time::{format_system_time, SystemTimeProvider};
use crate::remote::api::{
    BranchCatalog, GitHubClient, OwnerType, RemoteError, RemoteRepositoryClient, RepositoryRef,
};
use crate::scanner::api::{
    CompatibilityRule, RepositoryCandidate, RepositoryScanner, ScanError, ScanPhase, ScanProgress,
    ScannerConfig,
};
use crate::staging::api::{
    BasicContentValidator, Severity, StagingError, StagingGround, ValidationResult,
};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Any failure a command can report
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Usage(String),
}

impl ContextualError for CommandError {
    fn is_user_actionable(&self) -> bool {
        match self {
            CommandError::Config(e) => e.is_user_actionable(),
            CommandError::Remote(e) => e.is_user_actionable(),
            CommandError::Scan(e) => e.is_user_actionable(),
            CommandError::Staging(e) => e.is_user_actionable(),
            CommandError::Cache(e) => e.is_user_actionable(),
            CommandError::Storage(_) => false,
            CommandError::Io { .. } | CommandError::Usage(_) => true,
        }
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Engine components shared by every command
pub struct Engine {
    settings: Settings,
    client: Arc<dyn RemoteRepositoryClient>,
    store: Arc<dyn KeyValueStore>,
    limiter: Arc<RateLimiter>,
    coordinator: CacheCoordinator,
}

impl Engine {
    /// Build the engine against the configured remote API and local store
    pub fn build(settings: Settings) -> CommandResult<Self> {
        let client = GitHubClient::new(
            &settings.api_url,
            settings.token(),
            settings.probe_timeout(),
        )?;
        if !client.is_authenticated() {
            log::warn!(
                "No API token in ${}; requests are anonymous and heavily rate limited",
                settings.token_env
            );
        }

        let store: Arc<dyn KeyValueStore> = match (&settings.data_dir, settings.ephemeral) {
            (Some(dir), false) => Arc::new(FileStore::open(dir)?),
            _ => {
                log::debug!("Using in-memory storage");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::with_components(settings, Arc::new(client), store))
    }

    /// Assemble the engine from explicit components
    pub fn with_components(
        settings: Settings,
        client: Arc<dyn RemoteRepositoryClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let cache = CacheStore::new(store.clone(), Arc::new(SystemTimeProvider));
        Self {
            limiter: Arc::new(RateLimiter::new(settings.requests_per_second)),
            coordinator: CacheCoordinator::new(cache),
            settings,
            client,
            store,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scanner(&self) -> CommandResult<RepositoryScanner> {
        let config = ScannerConfig {
            probe_concurrency: self.settings.probe_concurrency,
            probe_timeout: self.settings.probe_timeout(),
            cache_ttl_secs: self.settings.scan_cache_ttl_secs,
            rule: CompatibilityRule::new(
                &self.settings.marker_path,
                &self.settings.required_identifier,
            ),
            ..ScannerConfig::default()
        };
        Ok(RepositoryScanner::new(
            self.client.clone(),
            self.coordinator.cache().clone(),
            self.limiter.clone(),
            config,
        )?)
    }

    pub fn branch_catalog(&self) -> BranchCatalog {
        BranchCatalog::new(
            self.client.clone(),
            self.coordinator.cache().clone(),
            self.limiter.clone(),
        )
        .with_ttl(self.settings.branch_cache_ttl_secs)
    }

    pub fn staging(&self) -> StagingGround {
        StagingGround::new(
            self.client.clone(),
            self.store.clone(),
            self.limiter.clone(),
            Arc::new(BasicContentValidator),
        )
    }

    pub fn coordinator(&self) -> &CacheCoordinator {
        &self.coordinator
    }
}

/// Dispatch one parsed command
pub async fn run(engine: &Engine, command: &Command, cancel: &CancelToken) -> CommandResult<()> {
    match command {
        Command::Scan {
            owner,
            org,
            refresh,
        } => {
            let owner_type = if *org {
                OwnerType::Organization
            } else {
                OwnerType::User
            };
            scan(engine, owner, owner_type, *refresh, cancel).await
        }
        Command::Branches {
            owner,
            repo,
            refresh,
        } => branches(engine, owner, repo, *refresh).await,
        Command::Cache(cache_command) => cache(engine, cache_command),
        Command::Stage(stage_command) => stage(engine, stage_command).await,
    }
}

async fn scan(
    engine: &Engine,
    owner: &str,
    owner_type: OwnerType,
    refresh: bool,
    cancel: &CancelToken,
) -> CommandResult<()> {
    let scanner = engine.scanner()?;
    if refresh && scanner.invalidate(owner) {
        log::debug!("Dropped cached scan results for '{}'", owner);
    }

    let report = scanner
        .scan_with_report(owner, owner_type, print_candidate, print_progress, cancel)
        .await?;

    eprintln!();
    let source = if report.from_cache { " (cached)" } else { "" };
    let headline = format!(
        "{} compatible of {} scanned{}",
        report.candidates.len(),
        report.scanned,
        source
    );
    if report.cancelled {
        println!("{} {}", "Cancelled:".yellow().bold(), headline);
    } else {
        println!("{} {}", "Done:".green().bold(), headline);
    }
    for failure in &report.failures {
        println!("  {} {}: {}", "!".yellow(), failure.repository, failure.reason.dimmed());
    }
    Ok(())
}

fn print_candidate(candidate: RepositoryCandidate) {
    let visibility = if candidate.private { " [private]" } else { "" };
    println!(
        "{} {}{} {}",
        "+".green().bold(),
        candidate.full_name().bold(),
        visibility,
        format!("({} stars, {} forks)", candidate.stars, candidate.forks).dimmed()
    );
    if let Some(description) = candidate.description.as_deref().filter(|d| !d.is_empty()) {
        println!("    {}", description.dimmed());
    }
}

fn print_progress(progress: ScanProgress) {
    if progress.phase != ScanPhase::Running {
        return;
    }
    eprint!(
        "\r[{}/{}] {:>5.1}% {:<40}",
        progress.scanned, progress.total, progress.percentage, progress.current_name
    );
    let _ = std::io::stderr().flush();
}

async fn branches(engine: &Engine, owner: &str, repo: &str, refresh: bool) -> CommandResult<()> {
    let branches = engine
        .branch_catalog()
        .branches(owner, repo, refresh)
        .await?;
    for branch in branches {
        let marker = if branch.protected { " (protected)" } else { "" };
        let short_sha: String = branch.head_sha.chars().take(7).collect();
        println!("{} {}{}", short_sha.dimmed(), branch.name, marker.yellow());
    }
    Ok(())
}

fn cache(engine: &Engine, command: &CacheCommand) -> CommandResult<()> {
    let coordinator = engine.coordinator();
    match command {
        CacheCommand::Stats => {
            let stats = coordinator.stats()?;
            println!(
                "{} entries, {} bytes",
                stats.entry_count.to_string().bold(),
                stats.total_bytes
            );
            for namespace in coordinator.namespaces() {
                println!("  {:<10} {}", namespace, stats.namespace_count(namespace));
            }
        }
        CacheCommand::Clear { namespace: Some(ns) } => {
            if !coordinator.namespaces().iter().any(|known| *known == ns.as_str()) {
                log::warn!("'{}' is not a namespace used by the engine", ns);
            }
            let removed = coordinator.clear(ns)?;
            println!("Cleared {} entries from '{}'", removed, ns);
        }
        CacheCommand::Clear { namespace: None } => {
            let removed = coordinator.clear_everything()?;
            println!("Cleared {} cache entries; staged edits were kept", removed);
        }
    }
    Ok(())
}

fn parse_repository(value: &str) -> CommandResult<RepositoryRef> {
    value.parse().map_err(CommandError::Usage)
}

async fn stage(engine: &Engine, command: &StageCommand) -> CommandResult<()> {
    let staging = engine.staging();
    match command {
        StageCommand::Add {
            session,
            path,
            file,
            base,
            fetch_base,
            editor,
        } => {
            let repository = parse_repository(&session.repository)?;
            let content = tokio::fs::read(file)
                .await
                .map_err(|source| CommandError::Io {
                    path: file.clone(),
                    source,
                })?;
            let base_version = if *fetch_base {
                remote_fingerprint(engine, &repository, &session.branch, path).await?
            } else {
                base.clone()
            };
            staging
                .stage_file(
                    &repository,
                    &session.branch,
                    path,
                    content,
                    base_version.clone(),
                    editor,
                )
                .await?;
            let base_label = base_version.as_deref().unwrap_or("new file");
            println!("Staged {} ({})", path.bold(), base_label.dimmed());
        }
        StageCommand::Rm { session, path } => {
            let repository = parse_repository(&session.repository)?;
            if staging.remove_file(&repository, &session.branch, path).await? {
                println!("Unstaged {}", path);
            } else {
                println!("{} was not staged", path);
            }
        }
        StageCommand::Status { repository, branch } => match (repository, branch) {
            (Some(repository), Some(branch)) => {
                status(&staging, &parse_repository(repository)?, branch).await?
            }
            (None, None) => {
                let sessions = staging.sessions()?;
                if sessions.is_empty() {
                    println!("No staged edits");
                }
                for key in sessions {
                    println!("{}", key);
                }
            }
            _ => {
                return Err(CommandError::Usage(
                    "status needs both a repository and a branch, or neither".to_string(),
                ))
            }
        },
        StageCommand::Discard { session } => {
            let repository = parse_repository(&session.repository)?;
            let discarded = staging.discard_all(&repository, &session.branch).await?;
            println!("Discarded {} staged file(s)", discarded);
        }
        StageCommand::Validate { session } => {
            let repository = parse_repository(&session.repository)?;
            let result = staging.validate(&repository, &session.branch).await?;
            print_validation(&result);
        }
        StageCommand::Message { session, message } => {
            let repository = parse_repository(&session.repository)?;
            if !staging
                .set_commit_message(&repository, &session.branch, message)
                .await?
            {
                return Err(CommandError::Staging(StagingError::NothingToCommit {
                    session: format!("{}@{}", repository, session.branch),
                }));
            }
            println!("Saved draft commit message");
        }
        StageCommand::Commit {
            session,
            message,
            allow_warnings,
        } => commit(&staging, session, message.as_deref(), *allow_warnings).await?,
    }
    Ok(())
}

async fn remote_fingerprint(
    engine: &Engine,
    repository: &RepositoryRef,
    branch: &str,
    path: &str,
) -> CommandResult<Option<String>> {
    let fetched = engine
        .limiter
        .execute(move || {
            engine
                .client
                .get_file(&repository.owner, &repository.name, path, Some(branch))
        })
        .await;
    match fetched {
        Ok(file) => Ok(Some(file.fingerprint)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn status(staging: &StagingGround, repository: &RepositoryRef, branch: &str) -> CommandResult<()> {
    let state = staging.state(repository, branch)?;
    let Some(session) = staging.session(repository, branch).await? else {
        println!("{}@{}: {}", repository, branch, state);
        return Ok(());
    };
    println!(
        "{}: {} ({} file(s), {} bytes)",
        session.key.to_string().bold(),
        state,
        session.file_count(),
        session.total_bytes()
    );
    if !session.commit_message_draft.is_empty() {
        println!("  draft: {}", session.commit_message_draft);
    }
    for file in session.files.values() {
        let base = file.base_version.as_deref().unwrap_or("new");
        println!(
            "  {} {} {}",
            file.path,
            format!("[{}]", base).dimmed(),
            format!("{} via {}", format_system_time(file.timestamp), file.editor).dimmed()
        );
    }
    Ok(())
}

fn print_validation(result: &ValidationResult) {
    if result.is_clean() && result.issues.is_empty() {
        println!("{}", "No issues found".green());
        return;
    }
    for issue in &result.issues {
        let label = match issue.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Info => "info".blue(),
        };
        println!("{} {}: {}", label, issue.path, issue.message);
    }
    println!(
        "{} error(s), {} warning(s), {} info",
        result.error_count, result.warning_count, result.info_count
    );
}

async fn commit(
    staging: &StagingGround,
    session: &SessionArgs,
    message: Option<&str>,
    allow_warnings: bool,
) -> CommandResult<()> {
    let repository = parse_repository(&session.repository)?;
    match staging
        .commit(&repository, &session.branch, message, allow_warnings)
        .await
    {
        Ok(result) => {
            println!(
                "{} {} file(s) to {}: {}",
                "Committed".green().bold(),
                result.files.len(),
                result.session,
                result.message
            );
            for file in &result.files {
                println!("  {} {}", file.path, file.new_fingerprint.dimmed());
            }
            Ok(())
        }
        Err(StagingError::ValidationBlocked(result)) => {
            print_validation(&result);
            if !result.has_errors() {
                println!("Re-run with --allow-warnings to commit anyway");
            }
            Err(StagingError::ValidationBlocked(result).into())
        }
        Err(e) => Err(e.into()),
    }
}

//! Staging ground error types

use crate::core::error_handling::ContextualError;
use crate::remote::error::RemoteError;
use crate::staging::validation::ValidationResult;

/// Failures of staging and commit operations. These are always surfaced to the
/// caller and never retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Commit blocked by validation: {}", blocked_summary(.0))]
    ValidationBlocked(ValidationResult),

    #[error("Remote changed since staging in {session}: {}; re-sync these files before committing", join_paths(.paths))]
    Conflict { session: String, paths: Vec<String> },

    #[error("Nothing staged for {session}")]
    NothingToCommit { session: String },

    #[error("Commit of {session} partially applied: wrote {} before {failed_path} failed: {source}", join_paths(.written))]
    PartialCommit {
        session: String,
        written: Vec<String>,
        failed_path: String,
        #[source]
        source: RemoteError,
    },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Staging storage error: {0}")]
    Storage(String),
}

fn join_paths(paths: &[String]) -> String {
    paths.join(", ")
}

fn blocked_summary(result: &ValidationResult) -> String {
    let mut summary = format!(
        "{} error(s), {} warning(s)",
        result.error_count, result.warning_count
    );
    for issue in &result.blocking_issues {
        summary.push_str(&format!("\n  {}", issue));
    }
    summary
}

impl From<crate::cache::error::StorageError> for StagingError {
    fn from(error: crate::cache::error::StorageError) -> Self {
        StagingError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for StagingError {
    fn from(error: serde_json::Error) -> Self {
        StagingError::Storage(format!("session record: {}", error))
    }
}

impl ContextualError for StagingError {
    fn is_user_actionable(&self) -> bool {
        match self {
            StagingError::Storage(_) => false,
            StagingError::Remote(e) => e.is_user_actionable(),
            _ => true,
        }
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

pub type StagingResult<T> = Result<T, StagingError>;

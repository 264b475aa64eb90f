//! Remote repository API error types

use std::time::Duration;

/// Failures of calls against the remote code-hosting API
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Access to {resource} forbidden: {message}")]
    Forbidden { resource: String, message: String },

    #[error("Remote API rate limit reached{}", retry_suffix(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Version conflict on {path}: expected {}, found {}", or_label(.expected, "<new file>"), or_label(.actual, "<absent>"))]
    Conflict {
        path: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

fn retry_suffix(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    }
}

fn or_label<'a>(value: &'a Option<String>, label: &'a str) -> &'a str {
    value.as_deref().unwrap_or(label)
}

impl RemoteError {
    /// Errors worth retrying for idempotent reads
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transport(_) | RemoteError::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            RemoteError::Decode(error.to_string())
        } else {
            RemoteError::Transport(error.to_string())
        }
    }
}

impl crate::core::error_handling::ContextualError for RemoteError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            RemoteError::Forbidden { .. }
                | RemoteError::RateLimited { .. }
                | RemoteError::Conflict { .. }
                | RemoteError::NotFound { .. }
        )
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

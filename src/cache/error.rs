//! Cache and durable storage error types

use std::path::PathBuf;

/// Errors raised by a durable key-value medium
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Storage quota exceeded ({used} of {quota} bytes in use)")]
    QuotaExceeded { used: usize, quota: usize },

    #[error("{0}")]
    Lock(String),
}

/// Result type for durable storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the namespaced cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid cache namespace '{namespace}': {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl From<StorageError> for CacheError {
    fn from(error: StorageError) -> Self {
        CacheError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::Serialization(error.to_string())
    }
}

impl crate::core::error_handling::ContextualError for CacheError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, CacheError::InvalidNamespace { .. })
    }

    fn user_message(&self) -> Option<String> {
        match self {
            CacheError::InvalidNamespace { .. } => Some(self.to_string()),
            _ => None,
        }
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

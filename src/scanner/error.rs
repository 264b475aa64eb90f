//! Scanner Error Types

use crate::core::error_handling::ContextualError;
use crate::remote::error::RemoteError;
use std::fmt;

/// Scan-level failures. Per-repository probe failures never surface here; they
/// are recorded in the scan report instead.
#[derive(Debug, Clone)]
pub enum ScanError {
    /// The owner's repositories could not be listed at all
    Listing { owner: String, source: RemoteError },
    /// Invalid scanner configuration
    Configuration { message: String },
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Listing { owner, source } => {
                write!(f, "Cannot list repositories of '{}': {}", owner, source)
            }
            ScanError::Configuration { message } => write!(f, "Configuration error: {}", message),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Listing { source, .. } => Some(source),
            ScanError::Configuration { .. } => None,
        }
    }
}

impl ContextualError for ScanError {
    fn is_user_actionable(&self) -> bool {
        match self {
            ScanError::Configuration { .. } => true,
            ScanError::Listing { source, .. } => source.is_user_actionable(),
        }
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

pub type ScanResult<T> = Result<T, ScanError>;

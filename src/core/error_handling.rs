//! Generic error reporting utilities
//!
//! Errors from every engine module implement [`ContextualError`] so the
//! presentation layer can decide between showing a precise, actionable message
//! (a conflicting path, a blocked validation) and a generic context line with the
//! technical detail kept at debug level (transport failures, storage errors).

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message the user can act on directly
    ///
    /// Examples of user-actionable errors:
    /// - Commit conflicts naming the paths that moved remotely
    /// - Validation blocks
    /// - Invalid configuration values
    ///
    /// Examples of system errors:
    /// - Network timeouts
    /// - Local storage failures
    fn is_user_actionable(&self) -> bool;

    /// The specific user message if this is a user-actionable error
    fn user_message(&self) -> Option<String>;
}

/// Render the line shown to the user for `error`
pub fn user_facing_message<E: ContextualError + ?Sized>(error: &E, operation_context: &str) -> String {
    if error.is_user_actionable() {
        if let Some(user_msg) = error.user_message() {
            return user_msg;
        }
    }
    format!("{operation_context} failed")
}

/// Log errors with appropriate detail level based on error specificity
///
/// # Examples
/// ```rust,no_run
/// # use dak_engine::core::error_handling::log_error_with_context;
/// # use dak_engine::staging::api::StagingError;
/// let err = StagingError::NothingToCommit {
///     session: "who/smart-demo@main".to_string(),
/// };
/// log_error_with_context(&err, "Commit staged changes");
/// // Logs: "ERROR: Nothing staged for who/smart-demo@main"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    log::error!("ERROR: {}", user_facing_message(error, operation_context));
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

//! Public API for the staging ground

pub use crate::staging::error::{StagingError, StagingResult};
pub use crate::staging::ground::StagingGround;
pub use crate::staging::types::{
    CommitResult, SessionKey, SessionState, StagedFile, StagingSession,
};
pub use crate::staging::validation::{
    BasicContentValidator, ContentValidator, FormatHint, Issue, Severity, ValidationResult,
};

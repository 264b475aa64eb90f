//! Staging Ground
//!
//! Local accumulation of uncommitted edits across content editors, committed
//! atomically to the remote repository:
//!
//! - **StagingGround**: per (repository, branch) sessions with replace-on-restage
//!   semantics, persisted to the durable store
//! - **Validation gate**: format checks plus prior-version checks before commit
//! - **Optimistic concurrency**: every fingerprint is checked before any write

pub mod api;
pub mod error;
pub mod ground;
pub mod types;
pub mod validation;

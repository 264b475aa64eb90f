//! Remote Repository Access
//!
//! Contract over the code-hosting API consumed by the scanner and the staging
//! ground, with a GitHub REST implementation and a cached branch catalog.

pub mod api;
pub mod branches;
pub mod error;
pub mod github;
pub mod traits;
pub mod types;

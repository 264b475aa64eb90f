//! Scanner Component
//!
//! Progressive, rate-limited discovery of DAK repositories for a user or
//! organization:
//!
//! - **RepositoryScanner**: lists an owner's repositories and probes each one
//!   through the bounded task runner and the shared rate limiter
//! - **CompatibilityRule**: marker file plus the identifier it must declare
//! - **Streaming callbacks**: candidates are reported as soon as their probe
//!   resolves, progress on every state change
//! - **Caching**: completed scans are served from the `repos` namespace until
//!   their TTL expires

pub mod api;
pub mod error;
pub mod manager;
pub mod probe;
pub mod types;

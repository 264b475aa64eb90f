//! Concurrency Primitives
//!
//! Request pacing and bounded parallelism shared by the scanner and the staging
//! ground:
//!
//! - **RateLimiter**: spaces remote call start times by a fixed interval, FIFO
//! - **ConcurrentTaskRunner**: bounded worker pool with ordered results,
//!   per-item failure capture, optional fail-fast and cooperative cancellation

pub mod api;
pub mod rate_limiter;
pub mod runner;

//! Public API for the concurrency primitives

pub use crate::concurrency::rate_limiter::RateLimiter;
pub use crate::concurrency::runner::{ConcurrentTaskRunner, RunnerConfig, TaskOutcome};

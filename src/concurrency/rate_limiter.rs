//! Fixed-spacing rate limiter for outbound remote API calls
//!
//! Every task started through one [`RateLimiter`] instance begins at least
//! `1000 / requests_per_second` milliseconds after the previous one. Callers reserve
//! a start slot under a fair (FIFO) lock, so start order equals call order.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Serialises the start times of remote calls
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    /// Earliest instant at which the next task may start
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` task starts per second.
    ///
    /// A rate of zero is treated as one request per second.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = requests_per_second.max(1);
        Self::with_interval(Duration::from_nanos(1_000_000_000 / u64::from(rps)))
    }

    /// Create a limiter with an explicit minimum spacing between task starts
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Run `task` once its start slot is reached.
    ///
    /// The slot is consumed even if the task fails, so failing callers cannot
    /// reclaim budget for immediate retries.
    pub async fn execute<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let start_at = self.reserve_slot().await;
        sleep_until(start_at).await;
        task().await
    }

    async fn reserve_slot(&self) -> Instant {
        let mut cursor = self.next_allowed.lock().await;
        let now = Instant::now();
        let start_at = match *cursor {
            Some(next) if next > now => next,
            _ => now,
        };
        *cursor = Some(start_at + self.min_interval);
        start_at
    }
}

//! Bounded-concurrency task runner
//!
//! Runs one asynchronous worker per input item with at most `concurrency`
//! workers in flight. Results are returned in input order regardless of
//! completion order. Individual failures are captured per slot; they only stop
//! the remaining items when fail-fast is enabled.

use crate::core::cancel::CancelToken;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result slot for one input item
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<O, E> {
    /// The worker ran and succeeded
    Completed(O),
    /// The worker ran and failed
    Failed(E),
    /// The worker never started (cancelled, or halted by fail-fast)
    Skipped,
}

impl<O, E> TaskOutcome<O, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TaskOutcome::Skipped)
    }
}

/// Runner configuration
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Maximum number of workers in flight (minimum 1)
    pub concurrency: usize,
    /// Stop starting new items after the first failure
    pub fail_fast: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            fail_fast: false,
        }
    }
}

/// Bounded worker pool over an input sequence
#[derive(Debug, Clone, Default)]
pub struct ConcurrentTaskRunner {
    config: RunnerConfig,
}

impl ConcurrentTaskRunner {
    pub fn new(concurrency: usize) -> Self {
        Self::with_config(RunnerConfig {
            concurrency,
            ..RunnerConfig::default()
        })
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.config.fail_fast = enabled;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Run `worker` over every item and collect outcomes in input order.
    ///
    /// `cancel` is checked before each item starts; items already running are
    /// allowed to finish and later items are reported as [`TaskOutcome::Skipped`].
    pub async fn run_all<I, O, E, W, Fut>(
        &self,
        items: Vec<I>,
        worker: W,
        cancel: &CancelToken,
    ) -> Vec<TaskOutcome<O, E>>
    where
        W: Fn(I) -> Fut,
        Fut: Future<Output = Result<O, E>>,
    {
        let mut slots: Vec<TaskOutcome<O, E>> = items.iter().map(|_| TaskOutcome::Skipped).collect();
        let halted = AtomicBool::new(false);
        let worker = &worker;
        let halted_ref = &halted;

        let mut in_flight = stream::iter(items.into_iter().enumerate())
            .map(move |(index, item)| async move {
                if cancel.is_cancelled() || halted_ref.load(Ordering::Acquire) {
                    return (index, None);
                }
                (index, Some(worker(item).await))
            })
            .buffer_unordered(self.concurrency());

        while let Some((index, result)) = in_flight.next().await {
            slots[index] = match result {
                None => TaskOutcome::Skipped,
                Some(Ok(value)) => TaskOutcome::Completed(value),
                Some(Err(error)) => {
                    if self.config.fail_fast {
                        log::debug!("Item {} failed; fail-fast halts remaining items", index);
                        halted.store(true, Ordering::Release);
                    }
                    TaskOutcome::Failed(error)
                }
            };
        }

        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        let runner = ConcurrentTaskRunner::new(2);
        let delays = vec![("a", 30u64), ("b", 5), ("c", 10)];

        let outcomes = runner
            .run_all(
                delays,
                |(name, delay)| async move {
                    sleep(Duration::from_millis(delay)).await;
                    Ok::<_, String>(format!("result-{}", name))
                },
                &CancelToken::new(),
            )
            .await;

        assert_eq!(
            outcomes,
            vec![
                TaskOutcome::Completed("result-a".to_string()),
                TaskOutcome::Completed("result-b".to_string()),
                TaskOutcome::Completed("result-c".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let runner = ConcurrentTaskRunner::new(3);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = runner
            .run_all(
                (0..10).collect(),
                |_| {
                    let active = active.clone();
                    let peak = peak.clone();
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), ()>(())
                    }
                },
                &CancelToken::new(),
            )
            .await;

        assert_eq!(outcomes.len(), 10);
        assert!(outcomes.iter().all(TaskOutcome::is_completed));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let runner = ConcurrentTaskRunner::new(2);

        let outcomes = runner
            .run_all(
                vec![1, 2, 3, 4],
                |n| async move {
                    if n == 2 {
                        Err(format!("item {} failed", n))
                    } else {
                        Ok(n * 10)
                    }
                },
                &CancelToken::new(),
            )
            .await;

        assert_eq!(outcomes[0], TaskOutcome::Completed(10));
        assert_eq!(outcomes[1], TaskOutcome::Failed("item 2 failed".to_string()));
        assert_eq!(outcomes[2], TaskOutcome::Completed(30));
        assert_eq!(outcomes[3], TaskOutcome::Completed(40));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining_items() {
        let runner = ConcurrentTaskRunner::new(1).fail_fast(true);
        let started = Arc::new(AtomicUsize::new(0));

        let outcomes = runner
            .run_all(
                vec![1, 2, 3, 4],
                |n| {
                    let started = started.clone();
                    async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        if n == 2 {
                            Err("stop")
                        } else {
                            Ok(n)
                        }
                    }
                },
                &CancelToken::new(),
            )
            .await;

        assert_eq!(outcomes[0], TaskOutcome::Completed(1));
        assert_eq!(outcomes[1], TaskOutcome::Failed("stop"));
        assert!(outcomes[2].is_skipped());
        assert!(outcomes[3].is_skipped());
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_lets_running_items_finish() {
        let runner = ConcurrentTaskRunner::new(2);
        let cancel = CancelToken::new();

        let outcomes = runner
            .run_all(
                vec![0u64, 1, 2, 3, 4],
                |n| {
                    let cancel = cancel.clone();
                    async move {
                        sleep(Duration::from_millis(5)).await;
                        if n == 0 {
                            cancel.cancel();
                        }
                        sleep(Duration::from_millis(5)).await;
                        Ok::<_, ()>(n)
                    }
                },
                &cancel,
            )
            .await;

        // Items 0 and 1 were both in flight when cancellation happened
        assert_eq!(outcomes[0], TaskOutcome::Completed(0));
        assert_eq!(outcomes[1], TaskOutcome::Completed(1));
        assert!(outcomes[2..].iter().all(TaskOutcome::is_skipped));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let runner = ConcurrentTaskRunner::default();
        let outcomes: Vec<TaskOutcome<(), ()>> = runner
            .run_all(Vec::<u8>::new(), |_| async { Ok(()) }, &CancelToken::new())
            .await;
        assert!(outcomes.is_empty());
    }
}

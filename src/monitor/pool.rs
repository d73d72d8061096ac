//! Bounded-concurrency poll worker pool.
//!
//! A fixed set of workers consumes targets from a shared queue, capping how
//! many polls run at once. A task that fails outright is retried in place a
//! limited number of times; target-level failure accounting happens inside
//! the task itself.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::domain::Target;
use crate::monitor::poller::PollTask;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers, i.e. maximum polls in flight.
    pub max_concurrency: usize,
    /// Retries for a poll task that returns an error.
    pub retry_limit: u32,
}

/// Fixed worker set over an unbounded queue of targets.
pub struct PollWorkerPool {
    tx: mpsc::UnboundedSender<Target>,
    workers: JoinSet<()>,
}

impl PollWorkerPool {
    /// Spawn the workers. Cancelling `cancel` makes idle workers exit;
    /// a poll already in flight completes naturally.
    pub fn start(config: PoolConfig, task: Arc<dyn PollTask>, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Target>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = JoinSet::new();

        for worker_id in 0..config.max_concurrency.max(1) {
            let rx = rx.clone();
            let task = task.clone();
            let cancel = cancel.clone();
            let retry_limit = config.retry_limit;

            workers.spawn(async move {
                debug!(worker_id, "poll worker started");

                loop {
                    let target = {
                        let mut queue = rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            target = queue.recv() => target,
                        }
                    };

                    let Some(target) = target else {
                        break;
                    };

                    let mut attempt = 0u32;
                    loop {
                        match task.run(&target, &cancel).await {
                            Ok(()) => break,
                            Err(error) if attempt < retry_limit => {
                                attempt += 1;
                                warn!(
                                    target = %target,
                                    attempt,
                                    retry_limit,
                                    error = %error,
                                    "poll task failed; retrying"
                                );
                            }
                            Err(error) => {
                                error!(
                                    target = %target,
                                    error = %error,
                                    "poll task failed after {retry_limit} retries"
                                );
                                break;
                            }
                        }
                    }
                }

                debug!(worker_id, "poll worker stopped");
            });
        }

        Self { tx, workers }
    }

    /// Queue a target for polling. Returns false once the pool has shut down.
    pub fn enqueue(&self, target: Target) -> bool {
        self.tx.send(target).is_ok()
    }

    /// Close the queue and wait for every worker to finish.
    pub async fn shutdown(mut self) {
        drop(self.tx);
        while self.workers.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::error::{Error, Result};

    #[derive(Default)]
    struct GaugeTask {
        current: AtomicUsize,
        max_seen: AtomicUsize,
        completed: AtomicUsize,
    }

    #[async_trait]
    impl PollTask for GaugeTask {
        async fn run(&self, _target: &Target, _cancel: &CancellationToken) -> Result<()> {
            let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailingTask {
        runs: AtomicU32,
    }

    #[async_trait]
    impl PollTask for FailingTask {
        async fn run(&self, _target: &Target, _cancel: &CancellationToken) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Err(Error::Other("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let task = Arc::new(GaugeTask::default());
        let pool = PollWorkerPool::start(
            PoolConfig {
                max_concurrency: 3,
                retry_limit: 0,
            },
            task.clone(),
            CancellationToken::new(),
        );

        for i in 0..10 {
            assert!(pool.enqueue(Target::classify(format!("channel{i}"))));
        }
        pool.shutdown().await;

        assert_eq!(task.completed.load(Ordering::SeqCst), 10);
        assert!(task.max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_failed_task_is_retried() {
        let task = Arc::new(FailingTask::default());
        let pool = PollWorkerPool::start(
            PoolConfig {
                max_concurrency: 1,
                retry_limit: 2,
            },
            task.clone(),
            CancellationToken::new(),
        );

        pool.enqueue(Target::classify("somechannel"));
        pool.shutdown().await;

        // One initial run plus two retries.
        assert_eq!(task.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_workers_stop_taking_jobs() {
        let task = Arc::new(GaugeTask::default());
        let cancel = CancellationToken::new();
        let pool = PollWorkerPool::start(
            PoolConfig {
                max_concurrency: 1,
                retry_limit: 0,
            },
            task.clone(),
            cancel.clone(),
        );

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.enqueue(Target::classify("somechannel"));
        pool.shutdown().await;

        assert_eq!(task.completed.load(Ordering::SeqCst), 0);
    }
}

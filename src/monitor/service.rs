//! The monitoring round loop.
//!
//! Each round enqueues every cached target into the worker pool, then waits
//! for the next tick — rounds never wait for the queue to drain, so a slow
//! target cannot stall the cadence. A separate timer refreshes the target
//! snapshot; a round already in flight keeps the list it started with.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::domain::Target;
use crate::error::{Error, Result};
use crate::monitor::pool::{PoolConfig, PollWorkerPool};
use crate::monitor::poller::PollTask;
use crate::storage::{PersistenceBatcher, TargetCache};

pub struct MonitorService {
    cache: Arc<TargetCache>,
    task: Arc<dyn PollTask>,
    batcher: Arc<PersistenceBatcher>,
    config: MonitorConfig,
}

impl MonitorService {
    pub fn new(
        cache: Arc<TargetCache>,
        task: Arc<dyn PollTask>,
        batcher: Arc<PersistenceBatcher>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            cache,
            task,
            batcher,
            config,
        }
    }

    /// Warm the target cache; returns the current target count.
    pub async fn prime(&self) -> usize {
        self.cache.get().await.len()
    }

    /// Run rounds until cancelled. Errors out of a round (an empty target
    /// list at startup) are fatal to this run only; the controller decides
    /// whether to start another.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let targets = self.cache.get().await;
        if targets.is_empty() {
            return Err(Error::NoTargets);
        }

        info!(
            targets = targets.len(),
            max_concurrency = self.config.max_concurrency,
            loop_interval = ?self.config.loop_interval,
            "monitor loop started"
        );

        let snapshot = Arc::new(RwLock::new(targets));
        let pool = PollWorkerPool::start(
            PoolConfig {
                max_concurrency: self.config.max_concurrency,
                retry_limit: self.config.retry_limit,
            },
            self.task.clone(),
            cancel.clone(),
        );

        let refresh_task = tokio::spawn(refresh_targets(
            self.cache.clone(),
            snapshot.clone(),
            self.config.target_refresh_interval,
            cancel.clone(),
        ));

        let mut round_timer = tokio::time::interval(self.config.loop_interval);
        round_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = round_timer.tick() => {
                    let round = snapshot.read().await.clone();
                    debug!(targets = round.len(), "starting polling round");
                    for id in round {
                        if !pool.enqueue(Target::classify(id)) {
                            break;
                        }
                    }
                }
            }
        }

        info!("monitor loop stopping; draining in-flight polls");
        let _ = refresh_task.await;
        pool.shutdown().await;
        self.batcher.flush().await;
        info!("monitor loop stopped");

        Ok(())
    }
}

/// Periodically refresh the target snapshot used by upcoming rounds.
async fn refresh_targets(
    cache: Arc<TargetCache>,
    snapshot: Arc<RwLock<Vec<String>>>,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    timer.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = timer.tick() => {
                let targets = cache.get().await;
                debug!(targets = targets.len(), "target snapshot updated for next round");
                *snapshot.write().await = targets;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::config::BatcherConfig;
    use crate::domain::{HistoryRecord, PeakRecord};
    use crate::storage::{HistoryStore, PeakStore, TargetDirectory};

    struct FakeDirectory {
        targets: Vec<String>,
    }

    #[async_trait]
    impl TargetDirectory for FakeDirectory {
        async fn list_targets(&self) -> Result<Vec<String>> {
            Ok(self.targets.clone())
        }
    }

    #[derive(Default)]
    struct NullStore;

    #[async_trait]
    impl HistoryStore for NullStore {
        async fn insert_history(&self, _records: &[HistoryRecord]) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl PeakStore for NullStore {
        async fn get_peak(&self, _user_id: &str) -> Result<Option<u64>> {
            Ok(None)
        }

        async fn upsert_peak(&self, _record: &PeakRecord) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingTask {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl PollTask for CountingTask {
        async fn run(&self, _target: &Target, _cancel: &CancellationToken) -> Result<()> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn service(targets: Vec<&str>, task: Arc<dyn PollTask>, config: MonitorConfig) -> MonitorService {
        let directory = Arc::new(FakeDirectory {
            targets: targets.into_iter().map(String::from).collect(),
        });
        let store = Arc::new(NullStore);
        let cache = Arc::new(TargetCache::new(directory, Duration::from_secs(60)));
        let batcher = Arc::new(PersistenceBatcher::new(
            store.clone(),
            store,
            "youtube",
            BatcherConfig::default(),
        ));
        MonitorService::new(cache, task, batcher, config)
    }

    #[tokio::test]
    async fn test_empty_target_list_is_fatal() {
        let task = Arc::new(CountingTask::default());
        let service = service(vec![], task, MonitorConfig::default());

        let result = service.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::NoTargets)));
    }

    #[tokio::test]
    async fn test_rounds_enqueue_all_targets() {
        let task = Arc::new(CountingTask::default());
        let config = MonitorConfig {
            loop_interval: Duration::from_millis(30),
            max_concurrency: 2,
            ..MonitorConfig::default()
        };
        let service = service(vec!["a", "b", "c"], task.clone(), config);

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });

        service.run(cancel).await.unwrap();

        // At least the immediate round, likely several more.
        let polls = task.polls.load(Ordering::SeqCst);
        assert!(polls >= 3, "expected at least one full round, got {polls}");
    }
}

//! End-to-end monitoring flow over in-memory collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use peakwatch::Result;
use peakwatch::config::{BatcherConfig, MonitorConfig};
use peakwatch::domain::{HistoryRecord, PeakRecord, Target};
use peakwatch::monitor::{
    MonitorController, MonitorService, MonitorStatus, PollTask, TargetPoller, ViewerSource,
};
use peakwatch::storage::{
    HistoryStore, PeakStore, PersistenceBatcher, TargetCache, TargetDirectory,
};

struct FixedDirectory {
    targets: Vec<String>,
}

#[async_trait]
impl TargetDirectory for FixedDirectory {
    async fn list_targets(&self) -> Result<Vec<String>> {
        Ok(self.targets.clone())
    }
}

#[derive(Default)]
struct MemoryStore {
    history: Mutex<Vec<HistoryRecord>>,
    peaks: Mutex<HashMap<String, PeakRecord>>,
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn insert_history(&self, records: &[HistoryRecord]) -> Result<()> {
        self.history.lock().extend_from_slice(records);
        Ok(())
    }
}

#[async_trait]
impl PeakStore for MemoryStore {
    async fn get_peak(&self, user_id: &str) -> Result<Option<u64>> {
        Ok(self.peaks.lock().get(user_id).map(|r| r.max_peak))
    }

    async fn upsert_peak(&self, record: &PeakRecord) -> Result<()> {
        self.peaks
            .lock()
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }
}

struct FixedSource {
    text: Option<&'static str>,
}

#[async_trait]
impl ViewerSource for FixedSource {
    async fn fetch_viewer_text(&self, _target: &Target) -> Result<Option<String>> {
        Ok(self.text.map(String::from))
    }
}

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        loop_interval: Duration::from_millis(50),
        max_fails: 2,
        offline_block: Duration::from_secs(600),
        max_concurrency: 2,
        retry_limit: 1,
        min_update_interval: Duration::from_secs(30),
        change_threshold: 0.0,
        target_refresh_interval: Duration::from_secs(3600),
        restart_delay: Duration::from_secs(3600),
        ..MonitorConfig::default()
    }
}

fn build_stack(
    targets: Vec<&str>,
    source: Arc<dyn ViewerSource>,
    store: &Arc<MemoryStore>,
) -> (Arc<MonitorController>, Arc<TargetPoller>) {
    let config = fast_config();
    let directory = Arc::new(FixedDirectory {
        targets: targets.into_iter().map(String::from).collect(),
    });
    let cache = Arc::new(TargetCache::new(directory, Duration::from_secs(60)));
    let batcher = Arc::new(PersistenceBatcher::new(
        store.clone(),
        store.clone(),
        "youtube",
        BatcherConfig {
            max_batch_size: 1,
            max_batch_buffer: 200,
            flush_interval: Duration::from_secs(3600),
        },
    ));
    let poller = Arc::new(
        TargetPoller::new(source, batcher.clone(), config.clone())
            .with_retry_delays(Duration::from_millis(1), Duration::from_millis(1))
            .with_politeness(Duration::ZERO, Duration::ZERO),
    );
    let task: Arc<dyn PollTask> = poller.clone();
    let service = Arc::new(MonitorService::new(cache, task, batcher, config.clone()));
    (
        Arc::new(MonitorController::new(service, config.restart_delay)),
        poller,
    )
}

#[tokio::test]
async fn test_live_target_round_trip() {
    let store = Arc::new(MemoryStore::default());
    let source = Arc::new(FixedSource {
        text: Some("1.2k watching now"),
    });
    let (controller, poller) = build_stack(vec!["dQw4w9WgXcQ"], source, &store);

    controller.start().await.unwrap();
    assert_eq!(controller.status(), MonitorStatus::Running);

    tokio::time::sleep(Duration::from_millis(150)).await;
    controller.stop().await.unwrap();
    assert_eq!(controller.status(), MonitorStatus::Stopped);

    let history = store.history.lock();
    assert!(!history.is_empty(), "expected at least one history record");
    assert_eq!(history[0].user_id, "dQw4w9WgXcQ");
    assert_eq!(history[0].viewers, 1200);

    let peaks = store.peaks.lock();
    let peak = peaks.get("dQw4w9WgXcQ").expect("peak record written");
    assert_eq!(peak.max_peak, 1200);
    assert_eq!(peak.last_viewers, 1200);
    assert_eq!(peak.platform, "youtube");

    let state = poller.state_of("live:dQw4w9WgXcQ").unwrap();
    assert_eq!(state.last_viewers, 1200);
    assert_eq!(state.fail_count, 0);
}

#[tokio::test]
async fn test_unreachable_target_goes_offline() {
    let store = Arc::new(MemoryStore::default());
    let source = Arc::new(FixedSource { text: None });
    let (controller, poller) = build_stack(vec!["somechannel"], source, &store);

    controller.start().await.unwrap();

    // Two rounds at 50 ms reach the offline threshold of two failures.
    tokio::time::sleep(Duration::from_millis(250)).await;
    controller.stop().await.unwrap();

    let state = poller.state_of("channel:somechannel").unwrap();
    assert!(state.blocked_until.is_some(), "target should be blocked");

    let history = store.history.lock();
    let zero_records = history.iter().filter(|r| r.viewers == 0).count();
    assert_eq!(zero_records, 1, "exactly one zero-viewer record expected");

    let peaks = store.peaks.lock();
    assert_eq!(peaks.get("somechannel").unwrap().last_viewers, 0);
}

#[tokio::test]
async fn test_stop_flushes_buffered_history() {
    let store = Arc::new(MemoryStore::default());
    let source = Arc::new(FixedSource {
        text: Some("500 watching now"),
    });

    let config = fast_config();
    let directory = Arc::new(FixedDirectory {
        targets: vec!["somechannel".to_string()],
    });
    let cache = Arc::new(TargetCache::new(directory, Duration::from_secs(60)));
    // Large batch size: records stay buffered until the shutdown flush.
    let batcher = Arc::new(PersistenceBatcher::new(
        store.clone(),
        store.clone(),
        "youtube",
        BatcherConfig {
            max_batch_size: 1000,
            max_batch_buffer: 2000,
            flush_interval: Duration::from_secs(3600),
        },
    ));
    let poller = Arc::new(
        TargetPoller::new(source, batcher.clone(), config.clone())
            .with_retry_delays(Duration::from_millis(1), Duration::from_millis(1))
            .with_politeness(Duration::ZERO, Duration::ZERO),
    );
    let task: Arc<dyn PollTask> = poller.clone();
    let service = Arc::new(MonitorService::new(cache, task, batcher, config.clone()));
    let controller = Arc::new(MonitorController::new(service, config.restart_delay));

    controller.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(store.history.lock().is_empty(), "records should be buffered");

    controller.stop().await.unwrap();

    assert!(
        !store.history.lock().is_empty(),
        "stop should flush buffered history"
    );
}

//! Batched history persistence and peak upserts.
//!
//! History rows are buffered and written in bounded batches; a batch that
//! fails both insert attempts is dropped rather than re-enqueued, so a store
//! outage cannot grow memory or spawn a retry storm. The buffer itself is
//! bounded: the oldest excess is discarded, newest observations win.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BatcherConfig;
use crate::domain::{HistoryRecord, PeakRecord};
use crate::storage::repository::{HistoryStore, PeakStore};
use crate::utils::retry::retry_with_delay;

const INSERT_ATTEMPTS: u32 = 2;
const INSERT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Buffers history records and writes them in batches; owns peak upserts.
pub struct PersistenceBatcher {
    history: Arc<dyn HistoryStore>,
    peaks: Arc<dyn PeakStore>,
    platform: String,
    config: BatcherConfig,
    buffer: Mutex<VecDeque<HistoryRecord>>,
    /// Held for the duration of a flush; a concurrent flush call no-ops.
    flushing: tokio::sync::Mutex<()>,
}

impl PersistenceBatcher {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        peaks: Arc<dyn PeakStore>,
        platform: impl Into<String>,
        config: BatcherConfig,
    ) -> Self {
        Self {
            history,
            peaks,
            platform: platform.into(),
            config,
            buffer: Mutex::new(VecDeque::new()),
            flushing: tokio::sync::Mutex::new(()),
        }
    }

    /// Append a record; flushes when the buffer reaches the batch size.
    pub async fn push(&self, record: HistoryRecord) {
        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.push_back(record);
            Self::trim_excess(&mut buffer, self.config.max_batch_buffer);
            buffer.len() >= self.config.max_batch_size
        };

        if should_flush {
            self.flush().await;
        }
    }

    /// Drain the buffer in batches. A flush already in progress makes this
    /// call a no-op instead of double-sending.
    pub async fn flush(&self) {
        let Ok(_guard) = self.flushing.try_lock() else {
            debug!("flush already in progress; skipping");
            return;
        };

        loop {
            let batch: Vec<HistoryRecord> = {
                let mut buffer = self.buffer.lock();
                if buffer.is_empty() {
                    break;
                }
                let take = buffer.len().min(self.config.max_batch_size);
                buffer.drain(..take).collect()
            };

            let result = retry_with_delay(INSERT_ATTEMPTS, INSERT_RETRY_DELAY, "history insert", || {
                self.history.insert_history(&batch)
            })
            .await;

            match result {
                Ok(()) => info!(records = batch.len(), "history batch inserted"),
                Err(error) => {
                    error!(
                        records = batch.len(),
                        error = %error,
                        "dropping history batch after failed inserts"
                    );
                }
            }
        }

        // Pushes can outpace the drain above; re-apply the buffer bound.
        let mut buffer = self.buffer.lock();
        Self::trim_excess(&mut buffer, self.config.max_batch_buffer);
    }

    /// Read-modify-write of the running peak. `max_peak` only ever grows;
    /// failures are logged and swallowed.
    pub async fn save_peak(&self, user_id: &str, viewers: u64) {
        let current = match self.peaks.get_peak(user_id).await {
            Ok(Some(peak)) => peak,
            Ok(None) => 0,
            Err(error) => {
                error!(user_id, error = %error, "failed to read stored peak; skipping upsert");
                return;
            }
        };

        let record = PeakRecord {
            user_id: user_id.to_string(),
            platform: self.platform.clone(),
            max_peak: current.max(viewers),
            last_viewers: viewers,
        };

        match self.peaks.upsert_peak(&record).await {
            Ok(()) => info!(user_id, viewers, max_peak = record.max_peak, "peak saved"),
            Err(error) => error!(user_id, error = %error, "failed to save peak"),
        }
    }

    /// Number of records awaiting flush.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Start the background flush timer; bounds staleness under low volume.
    /// Performs a final flush when cancelled.
    pub fn spawn_periodic_flush(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let batcher = self.clone();
        let flush_interval = self.config.flush_interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(flush_interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            timer.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        batcher.flush().await;
                        debug!("periodic flush task stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        batcher.flush().await;
                    }
                }
            }
        })
    }

    fn trim_excess(buffer: &mut VecDeque<HistoryRecord>, max: usize) {
        if buffer.len() > max {
            let excess = buffer.len() - max;
            buffer.drain(..excess);
            warn!(
                dropped = excess,
                retained = max,
                "history buffer over capacity; discarded oldest records"
            );
        }
    }
}

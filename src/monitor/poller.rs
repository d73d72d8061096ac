//! One poll operation per target.
//!
//! A poll navigates to the target, extracts the viewer text, parses it and
//! runs the result through the persistence gate. Failures of any kind are
//! absorbed here — nothing a single target does may disturb other targets
//! or the round loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::domain::{HistoryRecord, Target};
use crate::error::{Error, Result};
use crate::monitor::source::ViewerSource;
use crate::monitor::state::{FailureOutcome, TargetState, TargetStates};
use crate::monitor::viewers::parse_viewers;
use crate::storage::PersistenceBatcher;
use crate::utils::retry::retry_with_delay;

const NAVIGATION_ATTEMPTS: u32 = 2;
const EXTRACTION_ATTEMPTS: u32 = 5;

/// A unit of work the worker pool can execute.
#[async_trait]
pub trait PollTask: Send + Sync {
    async fn run(&self, target: &Target, cancel: &CancellationToken) -> Result<()>;
}

/// Polls targets and feeds qualifying observations to the batcher.
pub struct TargetPoller {
    source: Arc<dyn ViewerSource>,
    batcher: Arc<PersistenceBatcher>,
    states: TargetStates,
    config: MonitorConfig,
    navigation_retry_delay: Duration,
    extraction_retry_delay: Duration,
    politeness_base: Duration,
    politeness_jitter: Duration,
}

impl TargetPoller {
    pub fn new(
        source: Arc<dyn ViewerSource>,
        batcher: Arc<PersistenceBatcher>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            batcher,
            states: TargetStates::new(),
            config,
            navigation_retry_delay: Duration::from_secs(2),
            extraction_retry_delay: Duration::from_secs(1),
            politeness_base: Duration::from_millis(1000),
            politeness_jitter: Duration::from_millis(2000),
        }
    }

    /// Override the fixed inter-attempt delays.
    pub fn with_retry_delays(mut self, navigation: Duration, extraction: Duration) -> Self {
        self.navigation_retry_delay = navigation;
        self.extraction_retry_delay = extraction;
        self
    }

    /// Override the randomized inter-target delay.
    pub fn with_politeness(mut self, base: Duration, jitter: Duration) -> Self {
        self.politeness_base = base;
        self.politeness_jitter = jitter;
        self
    }

    /// Snapshot of a target's state, for inspection.
    pub fn state_of(&self, state_key: &str) -> Option<TargetState> {
        self.states.get(state_key).map(|entry| entry.value().clone())
    }

    async fn poll(&self, target: &Target, cancel: &CancellationToken) -> Result<()> {
        let key = target.state_key();

        {
            let mut state = self.states.entry(key.clone()).or_default();
            if state.is_blocked(Instant::now()) {
                debug!(target = %key, "target blocked; skipping poll");
                return Ok(());
            }
        }

        // Navigation budget: transport failures here count toward the
        // offline threshold.
        let navigated = retry_with_delay(
            NAVIGATION_ATTEMPTS,
            self.navigation_retry_delay,
            "navigation",
            || self.source.fetch_viewer_text(target),
        )
        .await;

        let first = match navigated {
            Ok(first) => first,
            Err(error) => {
                warn!(target = %key, error = %error, "navigation failed after retries");
                self.handle_failure(target, &key).await;
                return Ok(());
            }
        };

        // Extraction budget: the page loads but the viewer element may
        // render late. Errors while re-probing count as failed attempts.
        let text = match first {
            Some(text) => Some(text),
            None => retry_with_delay(
                EXTRACTION_ATTEMPTS - 1,
                self.extraction_retry_delay,
                "viewer text extraction",
                || async {
                    match self.source.fetch_viewer_text(target).await {
                        Ok(Some(text)) => Ok(text),
                        Ok(None) => Err(Error::MissingViewerText),
                        Err(error) => Err(error),
                    }
                },
            )
            .await
            .ok(),
        };

        match text {
            Some(raw) => {
                if let Some(mut state) = self.states.get_mut(&key) {
                    state.record_success();
                }

                let viewers = parse_viewers(&raw);
                info!(target = %key, viewers, raw = %raw.trim(), "viewer count extracted");
                self.persist_if_significant(target, &key, viewers).await;
            }
            None => {
                warn!(target = %key, "no viewer text after retries");
                self.handle_failure(target, &key).await;
            }
        }

        self.politeness_delay(cancel).await;
        Ok(())
    }

    async fn persist_if_significant(&self, target: &Target, key: &str, viewers: u64) {
        let now = Instant::now();
        let should_persist = self
            .states
            .get(key)
            .map(|state| {
                state.should_persist(
                    viewers,
                    self.config.change_threshold,
                    self.config.min_update_interval,
                    now,
                )
            })
            .unwrap_or(true);

        if !should_persist {
            debug!(target = %key, viewers, "observation below change threshold; not persisted");
            return;
        }

        if let Some(mut state) = self.states.get_mut(key) {
            state.mark_persisted(viewers, now);
        }

        self.batcher
            .push(HistoryRecord {
                user_id: target.id.clone(),
                timestamp: Utc::now(),
                viewers,
            })
            .await;
        self.batcher.save_peak(&target.id, viewers).await;
    }

    /// Shared failure path for navigation, extraction and unexpected
    /// errors: one counter, one threshold, identical side effects.
    async fn handle_failure(&self, target: &Target, key: &str) {
        let outcome = {
            let mut state = self.states.entry(key.to_string()).or_default();
            state.record_failure(
                self.config.max_fails,
                self.config.offline_block,
                Instant::now(),
            )
        };

        match outcome {
            FailureOutcome::Counting(fails) => {
                warn!(target = %key, fails, "poll failed");
            }
            FailureOutcome::WentOffline => {
                info!(
                    target = %key,
                    block = ?self.config.offline_block,
                    "target considered offline; recording zero viewers and blocking"
                );
                self.batcher
                    .push(HistoryRecord {
                        user_id: target.id.clone(),
                        timestamp: Utc::now(),
                        viewers: 0,
                    })
                    .await;
                self.batcher.save_peak(&target.id, 0).await;
            }
        }
    }

    /// Randomized delay between targets; interruptible on shutdown.
    async fn politeness_delay(&self, cancel: &CancellationToken) {
        let jitter_ms = self.politeness_jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::random::<u64>() % jitter_ms)
        } else {
            Duration::ZERO
        };
        let delay = self.politeness_base + jitter;
        if delay.is_zero() {
            return;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[async_trait]
impl PollTask for TargetPoller {
    async fn run(&self, target: &Target, cancel: &CancellationToken) -> Result<()> {
        self.poll(target, cancel).await
    }
}

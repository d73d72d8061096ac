//! TTL-cached view over the target directory.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::storage::repository::TargetDirectory;

struct CacheState {
    targets: Vec<String>,
    fetched_at: Option<Instant>,
}

/// Read-through cache for the target list.
///
/// A refresh failure keeps serving the previous list rather than emptying
/// it; errors never cross this boundary.
pub struct TargetCache {
    directory: Arc<dyn TargetDirectory>,
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl TargetCache {
    pub fn new(directory: Arc<dyn TargetDirectory>, ttl: Duration) -> Self {
        Self {
            directory,
            ttl,
            state: RwLock::new(CacheState {
                targets: Vec::new(),
                fetched_at: None,
            }),
        }
    }

    /// Current target list, refreshed from the directory when stale.
    pub async fn get(&self) -> Vec<String> {
        {
            let state = self.state.read().await;
            if let Some(fetched_at) = state.fetched_at
                && fetched_at.elapsed() < self.ttl
            {
                debug!(targets = state.targets.len(), "serving cached target list");
                return state.targets.clone();
            }
        }

        // The write lock also deduplicates concurrent refreshes: whoever
        // loses the race re-checks freshness and serves the new list.
        let mut state = self.state.write().await;
        if let Some(fetched_at) = state.fetched_at
            && fetched_at.elapsed() < self.ttl
        {
            return state.targets.clone();
        }

        match self.directory.list_targets().await {
            Ok(targets) => {
                info!(targets = targets.len(), "target list refreshed");
                state.targets = targets;
                state.fetched_at = Some(Instant::now());
            }
            Err(error) => {
                warn!(
                    error = %error,
                    cached = state.targets.len(),
                    "target list refresh failed; serving stale list"
                );
            }
        }

        state.targets.clone()
    }
}

//! Store capability traits.
//!
//! The monitoring engine only ever sees these three seams; the concrete
//! store (and its schema) stays behind them.

use async_trait::async_trait;

use crate::domain::{HistoryRecord, PeakRecord};
use crate::error::Result;

/// Read access to the list of monitored target identifiers.
#[async_trait]
pub trait TargetDirectory: Send + Sync {
    /// Currently active (non-hidden) target identifiers for this platform.
    async fn list_targets(&self) -> Result<Vec<String>>;
}

/// Peak record access.
#[async_trait]
pub trait PeakStore: Send + Sync {
    /// Stored running peak for a target, or `None` when no record exists.
    async fn get_peak(&self, user_id: &str) -> Result<Option<u64>>;

    /// Insert or replace the peak record for `(user_id, platform)`.
    async fn upsert_peak(&self, record: &PeakRecord) -> Result<()>;
}

/// Append-only history access.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert a batch of history records.
    async fn insert_history(&self, records: &[HistoryRecord]) -> Result<()>;
}

//! Core domain types: monitored targets and persisted records.

mod records;
mod target;

pub use records::{HistoryRecord, PeakRecord};
pub use target::{Target, TargetKind};

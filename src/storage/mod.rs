//! Remote store access: repository traits, the Supabase implementation,
//! the target list cache and the history/peak persistence pipeline.

mod batcher;
mod cache;
mod repository;
mod supabase;

pub use batcher::PersistenceBatcher;
pub use cache::TargetCache;
pub use repository::{HistoryStore, PeakStore, TargetDirectory};
pub use supabase::SupabaseStore;

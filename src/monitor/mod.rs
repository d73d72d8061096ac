//! The monitoring engine: viewer-text parsing, the per-target state
//! machine, the bounded worker pool, the round loop and its lifecycle
//! controller.

mod controller;
mod pool;
mod poller;
mod service;
mod source;
mod state;
mod viewers;

pub use controller::{MonitorController, MonitorStatus};
pub use pool::{PollWorkerPool, PoolConfig};
pub use poller::{PollTask, TargetPoller};
pub use service::MonitorService;
pub use source::{HttpViewerSource, ViewerSource};
pub use state::{FailureOutcome, TargetState, TargetStates};
pub use viewers::parse_viewers;

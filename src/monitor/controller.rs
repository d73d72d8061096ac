//! Monitor lifecycle control.
//!
//! A small state machine around the round loop: `stopped → starting →
//! running → stopping → stopped`. The state tag is the single source of
//! truth guarding against double-start and double-stop, so control requests
//! may arrive concurrently from any number of callers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::monitor::service::MonitorService;

/// Lifecycle state of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Stopped => write!(f, "stopped"),
            MonitorStatus::Starting => write!(f, "starting"),
            MonitorStatus::Running => write!(f, "running"),
            MonitorStatus::Stopping => write!(f, "stopping"),
        }
    }
}

struct ControllerInner {
    status: MonitorStatus,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Idempotent start/stop/restart wrapper around [`MonitorService`].
pub struct MonitorController {
    service: Arc<MonitorService>,
    restart_delay: Duration,
    inner: Mutex<ControllerInner>,
}

impl MonitorController {
    pub fn new(service: Arc<MonitorService>, restart_delay: Duration) -> Self {
        Self {
            service,
            restart_delay,
            inner: Mutex::new(ControllerInner {
                status: MonitorStatus::Stopped,
                cancel: None,
                task: None,
            }),
        }
    }

    pub fn status(&self) -> MonitorStatus {
        self.inner.lock().status
    }

    /// Start the monitor. A no-op when already starting or running.
    pub async fn start(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if matches!(
                inner.status,
                MonitorStatus::Starting | MonitorStatus::Running
            ) {
                debug!(status = %inner.status, "monitor already started");
                return Ok(());
            }
            inner.status = MonitorStatus::Starting;
        }

        let targets = self.service.prime().await;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(
            self.service.clone(),
            cancel.clone(),
            self.restart_delay,
        ));

        {
            let mut inner = self.inner.lock();
            if inner.status != MonitorStatus::Starting {
                // A concurrent stop() raced us; abandon the fresh loop.
                cancel.cancel();
                return Ok(());
            }
            inner.cancel = Some(cancel);
            inner.task = Some(task);
            inner.status = MonitorStatus::Running;
        }

        info!(targets, "monitor started");
        Ok(())
    }

    /// Stop the monitor, letting the current round drain its in-flight
    /// polls and flushing buffered history. A no-op when already stopping
    /// or stopped.
    pub async fn stop(&self) -> Result<()> {
        let (cancel, task) = {
            let mut inner = self.inner.lock();
            if matches!(
                inner.status,
                MonitorStatus::Stopping | MonitorStatus::Stopped
            ) {
                debug!(status = %inner.status, "monitor already stopped");
                return Ok(());
            }
            inner.status = MonitorStatus::Stopping;
            (inner.cancel.take(), inner.task.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        if let Some(task) = task {
            if let Err(error) = task.await {
                error!(error = %error, "monitor loop task terminated abnormally");
            }
        }

        {
            let mut inner = self.inner.lock();
            // A concurrent start() may have taken over in the meantime;
            // only finalize the transition we own.
            if inner.status == MonitorStatus::Stopping {
                inner.status = MonitorStatus::Stopped;
            }
        }
        info!("monitor stopped");
        Ok(())
    }

    /// Stop then start. A failed stop is logged and start proceeds anyway.
    pub async fn restart(&self) -> Result<()> {
        if let Err(error) = self.stop().await {
            warn!(error = %error, "stop failed during restart; starting anyway");
        }
        self.start().await
    }
}

/// Keep the round loop alive: a fatal loop error restarts it after a fixed
/// delay until the controller cancels.
async fn supervise(service: Arc<MonitorService>, cancel: CancellationToken, restart_delay: Duration) {
    loop {
        match service.run(cancel.child_token()).await {
            Ok(()) => break,
            Err(error) => {
                error!(error = %error, delay = ?restart_delay, "monitor loop failed; scheduling restart");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(restart_delay) => {}
                }
                info!("restarting monitor loop");
            }
        }
    }
}

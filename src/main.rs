use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use peakwatch::api::{self, AppState};
use peakwatch::config::Settings;
use peakwatch::monitor::{
    HttpViewerSource, MonitorController, MonitorService, TargetPoller,
};
use peakwatch::storage::{PersistenceBatcher, SupabaseStore, TargetCache, TargetDirectory};
use peakwatch::utils::http::build_client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before anything reads them.
    dotenvy::dotenv().ok();

    let log_dir = std::env::var("LOG_DIR").ok();
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _log_guard = peakwatch::logging::init(log_dir.as_deref(), json_logs)?;

    let settings = Settings::from_env()?;
    info!(
        platform = %settings.store.platform,
        max_concurrency = settings.monitor.max_concurrency,
        loop_interval = ?settings.monitor.loop_interval,
        "starting peakwatch"
    );

    let client = build_client(settings.monitor.navigation_timeout);
    let store = Arc::new(SupabaseStore::new(client.clone(), &settings.store)?);
    let cache = Arc::new(TargetCache::new(
        store.clone() as Arc<dyn TargetDirectory>,
        settings.store.cache_ttl,
    ));
    let batcher = Arc::new(PersistenceBatcher::new(
        store.clone(),
        store.clone(),
        settings.store.platform.clone(),
        settings.batcher.clone(),
    ));

    let shutdown = CancellationToken::new();
    let flush_task = batcher.spawn_periodic_flush(shutdown.child_token());

    let source = Arc::new(HttpViewerSource::new(client));
    let poller = Arc::new(TargetPoller::new(
        source,
        batcher.clone(),
        settings.monitor.clone(),
    ));
    let service = Arc::new(MonitorService::new(
        cache.clone(),
        poller,
        batcher.clone(),
        settings.monitor.clone(),
    ));
    let controller = Arc::new(MonitorController::new(
        service,
        settings.monitor.restart_delay,
    ));

    controller.start().await?;

    let state = AppState {
        start_time: Instant::now(),
        controller: controller.clone(),
        cache,
        control_token: settings.api.control_token.clone(),
    };
    let api_task = tokio::spawn(api::serve(state, settings.api.clone(), shutdown.child_token()));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");

    if let Err(error) = controller.stop().await {
        error!(error = %error, "monitor stop failed during shutdown");
    }
    shutdown.cancel();

    let _ = flush_task.await;
    match api_task.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => error!(error = %error, "API server terminated with error"),
        Err(error) => error!(error = %error, "API server task panicked"),
    }

    info!("peakwatch stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).ok();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = async {
            match term.as_mut() {
                Some(term) => {
                    term.recv().await;
                }
                None => std::future::pending().await,
            }
        } => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

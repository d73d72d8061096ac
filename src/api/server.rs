//! API server setup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::routes;
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::monitor::MonitorController;
use crate::storage::TargetCache;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime reporting.
    pub start_time: Instant,
    /// Monitor lifecycle controller.
    pub controller: Arc<MonitorController>,
    /// Target list cache, for status reporting.
    pub cache: Arc<TargetCache>,
    /// Shared secret for the control endpoints; `None` leaves them open.
    pub control_token: Option<String>,
}

/// Serve the API until `cancel` fires.
pub async fn serve(state: AppState, config: ApiConfig, cancel: CancellationToken) -> Result<()> {
    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| Error::config(format!("invalid API bind address: {e}")))?;

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}

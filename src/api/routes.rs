//! API routes: liveness, monitor status and lifecycle control.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::api::server::AppState;

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/monitor/start", post(start_monitor))
        .route("/monitor/stop", post(stop_monitor))
        .route("/monitor/restart", post(restart_monitor))
        .with_state(state)
}

/// Token carried in a control request body.
#[derive(Debug, Default, Deserialize)]
struct ControlRequest {
    token: Option<String>,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "timestamp": Utc::now(),
    }))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let targets = state.cache.get().await;
    Json(json!({
        "status": state.controller.status().to_string(),
        "target_count": targets.len(),
        "targets": targets,
        "timestamp": Utc::now(),
    }))
}

async fn start_monitor(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Option<Json<ControlRequest>>,
) -> impl IntoResponse {
    if !authorized(&state.control_token, &headers, &params, body.as_deref()) {
        return unauthorized();
    }

    match state.controller.start().await {
        Ok(()) => control_ok(&state),
        Err(error) => control_error("start", &error),
    }
}

async fn stop_monitor(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Option<Json<ControlRequest>>,
) -> impl IntoResponse {
    if !authorized(&state.control_token, &headers, &params, body.as_deref()) {
        return unauthorized();
    }

    match state.controller.stop().await {
        Ok(()) => control_ok(&state),
        Err(error) => control_error("stop", &error),
    }
}

async fn restart_monitor(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Option<Json<ControlRequest>>,
) -> impl IntoResponse {
    if !authorized(&state.control_token, &headers, &params, body.as_deref()) {
        return unauthorized();
    }

    match state.controller.restart().await {
        Ok(()) => control_ok(&state),
        Err(error) => control_error("restart", &error),
    }
}

fn control_ok(state: &AppState) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": state.controller.status().to_string(),
            "timestamp": Utc::now(),
        })),
    )
}

fn control_error(op: &str, error: &crate::error::Error) -> (StatusCode, Json<serde_json::Value>) {
    warn!(error = %error, "monitor {op} request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": "error",
            "error": error.to_string(),
            "timestamp": Utc::now(),
        })),
    )
}

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "status": "error",
            "error": "invalid control token",
        })),
    )
}

/// Check the control token against the bearer header, a `token` query
/// parameter or the request body, in that order. No configured token means
/// the endpoints are open.
fn authorized(
    expected: &Option<String>,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
    body: Option<&ControlRequest>,
) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let provided = bearer
        .or_else(|| params.get("token").map(String::as_str))
        .or_else(|| body.and_then(|b| b.token.as_deref()));

    provided == Some(expected.as_str())
}

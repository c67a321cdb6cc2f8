//! Request handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::cache::AVAILABLE_KEY;
use crate::error::{RelayError, Result};

use super::server::AppState;

/// Serve the published snapshot as plain text, one connection string per
/// line. An absent snapshot (nothing published yet) is a retryable error.
pub async fn get_configs(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let snapshot = state
        .cache
        .get(AVAILABLE_KEY)
        .ok_or(RelayError::ConfigsUnavailable)?;

    let mut body = String::new();
    for descriptor in &snapshot {
        body.push_str(&descriptor.url);
        body.push('\n');
    }

    Ok((StatusCode::OK, body))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "relaywatch",
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        })),
    )
}

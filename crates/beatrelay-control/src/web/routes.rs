//! REST API route definitions

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use beatrelay_core::saturating_millis;

use super::handlers::{ApiResponse, StatusResponse};
use super::server::AppState;

/// Build the API router
pub fn build_router() -> Router<AppState> {
    Router::new().route("/api/status", get(get_status))
}

/// GET /api/status - Relay health
async fn get_status(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<StatusResponse>>) {
    let hub = match state.hub.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!("Status request failed: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(e.to_string())),
            );
        }
    };
    let stats = state.stats.snapshot();

    let status = StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        subscribers: hub.subscribers,
        upstream_connected: stats.upstream_connected,
        last_sample_age_ms: hub.last_sample_age.map(saturating_millis),
        samples_relayed: stats.samples_relayed,
        decode_failures: stats.decode_failures,
        upstream_connects: stats.upstream_connects,
    };

    (StatusCode::OK, Json(ApiResponse::success(status)))
}

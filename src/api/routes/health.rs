//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (index is readable)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Kubernetes readiness probe.
/// Returns 200 once the index can be read from the remote store.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.catalog.list().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /health
///
/// Full health status with component details.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (status, store, entries) = match state.catalog.list().await {
        Ok(snapshot) => ("healthy", "ok".to_string(), Some(snapshot.entries.len())),
        Err(e) => ("unhealthy", e.to_string(), None),
    };

    Json(HealthResponse {
        status: status.to_string(),
        store,
        entries,
        branch: state.catalog.index().branch().to_string(),
        sessions: state.catalog.sessions().len().await,
        media_cached: state.catalog.media().stats().await.entries,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

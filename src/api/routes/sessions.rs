//! Session Routes
//!
//! Browse sessions keep the gallery selection between requests.
//!
//! - POST /api/v1/sessions - Open a session
//! - GET /api/v1/sessions/:id - Reload the index and render the selection
//! - PUT /api/v1/sessions/:id/selection - Change the selection

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::SelectRequest;
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::catalog::GalleryView;

/// POST /api/v1/sessions
///
/// Opens a session and returns its first view.
pub async fn open_session(
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, Json<GalleryView>)> {
    let id = state.catalog.open_session().await;
    tracing::debug!(session = %id, "Session opened");

    let view = state.catalog.browse(id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GalleryView>> {
    Ok(Json(state.catalog.browse(id).await?))
}

/// PUT /api/v1/sessions/:id/selection
///
/// Out-of-range indices are clamped to the last entry.
pub async fn select_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SelectRequest>,
) -> ApiResult<Json<GalleryView>> {
    Ok(Json(state.catalog.select(id, req.index).await?))
}

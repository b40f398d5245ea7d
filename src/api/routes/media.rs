//! Media Routes
//!
//! - GET /api/v1/media?path= - Resolve a repository path to a data URI

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{MediaQuery, MediaResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::media::{is_media_path, MEDIA_DIRS};

/// GET /api/v1/media
///
/// Only files under `pic/` and `wav/` are served. `uri` is `null` when
/// the file cannot be fetched.
pub async fn resolve_media(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MediaQuery>,
) -> ApiResult<Json<MediaResponse>> {
    if query.path.trim().is_empty() {
        return Err(ApiError::Validation("path is required".to_string()));
    }
    if !is_media_path(&query.path) {
        return Err(ApiError::Validation(format!(
            "path must name a file under one of: {}",
            MEDIA_DIRS.join(", ")
        )));
    }

    let uri = state
        .catalog
        .media()
        .resolve_as_data_uri(&query.path)
        .await
        .map(|uri| uri.to_string());

    Ok(Json(MediaResponse {
        path: query.path,
        uri,
    }))
}

//! Entry Routes
//!
//! - GET /api/v1/entries - List the index
//! - GET /api/v1/entries/:id - One entry with media resolved
//! - POST /api/v1/entries - Add an entry (uploads base64 encoded)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{EntryListResponse, SubmitRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::catalog::{EntryView, SubmissionReport};

/// GET /api/v1/entries
///
/// Current index contents, sorted by id.
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<EntryListResponse>> {
    let snapshot = state.catalog.list().await?;

    Ok(Json(EntryListResponse {
        total: snapshot.entries.len(),
        entries: snapshot.entries,
        revision: snapshot.revision.map(|r| r.as_str().to_string()),
    }))
}

/// GET /api/v1/entries/:id
///
/// A missing image resolves to the placeholder; missing audio is omitted.
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<EntryView>> {
    Ok(Json(state.catalog.show(&id).await?))
}

/// POST /api/v1/entries
///
/// Validate the form, upload media and append the entry to the index.
pub async fn create_entry(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmissionReport>)> {
    let submission = req.into_submission().map_err(ApiError::Validation)?;
    let report = state.catalog.submit(submission).await?;

    tracing::info!(
        id = %report.entry.id,
        total = report.total_entries,
        "Entry created via API"
    );

    Ok((StatusCode::CREATED, Json(report)))
}

//! API route handlers.
//!
//! All endpoints return JSON. State is the engine's [`SyncView`].

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::engine::SyncView;
use crate::types::{FilterPatch, FilterSettings, RiskRecord, SignalRecord, SyncError, SyncSnapshot};

pub type AppState = SyncView;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Maps engine errors onto HTTP statuses.
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            SyncError::Scope => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = %status, error = %self.0, "API request failed");
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/snapshot
pub async fn get_snapshot(State(view): State<AppState>) -> Result<Json<SyncSnapshot>, ApiError> {
    Ok(Json(view.snapshot()?))
}

/// GET /api/risks
pub async fn get_risks(State(view): State<AppState>) -> Result<Json<Vec<RiskRecord>>, ApiError> {
    Ok(Json(view.snapshot()?.data))
}

/// GET /api/risks/filtered
pub async fn get_filtered_risks(
    State(view): State<AppState>,
) -> Result<Json<Vec<RiskRecord>>, ApiError> {
    Ok(Json(view.snapshot()?.filtered_data))
}

/// GET /api/signals
pub async fn get_signals(State(view): State<AppState>) -> Result<Json<Vec<SignalRecord>>, ApiError> {
    Ok(Json(view.snapshot()?.signals))
}

/// GET /api/filters
pub async fn get_filters(State(view): State<AppState>) -> Result<Json<FilterSettings>, ApiError> {
    Ok(Json(view.filters()?))
}

/// PATCH /api/filters
pub async fn patch_filters(
    State(view): State<AppState>,
    Json(patch): Json<FilterPatch>,
) -> Result<Json<FilterSettings>, ApiError> {
    Ok(Json(view.update_filters(patch)?))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! History ledger API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use pixerd_core::{HistoryRecord, Outcome, StoreError};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// One ledger record. Payloads are stored as raw bytes; they are
/// rendered lossily as UTF-8 for the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecordResponse {
    pub job_id: String,
    pub payload: String,
}

impl From<HistoryRecord> for HistoryRecordResponse {
    fn from(record: HistoryRecord) -> Self {
        Self {
            job_id: record.job_id,
            payload: String::from_utf8_lossy(&record.payload).into_owned(),
        }
    }
}

/// Response for listing one side of the ledger
#[derive(Debug, Serialize)]
pub struct ListHistoryResponse {
    pub records: Vec<HistoryRecordResponse>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct HistoryErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// List success records
pub async fn list_successes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListHistoryResponse>, impl IntoResponse> {
    list(state, Outcome::Success)
}

/// List failure records
pub async fn list_failures(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListHistoryResponse>, impl IntoResponse> {
    list(state, Outcome::Failure)
}

fn list(
    state: Arc<AppState>,
    outcome: Outcome,
) -> Result<Json<ListHistoryResponse>, (StatusCode, Json<HistoryErrorResponse>)> {
    let result = match outcome {
        Outcome::Success => state.history().list_successes(),
        Outcome::Failure => state.history().list_failures(),
    };
    match result {
        Ok(records) => {
            let records: Vec<HistoryRecordResponse> =
                records.into_iter().map(HistoryRecordResponse::from).collect();
            let total = records.len();
            Ok(Json(ListHistoryResponse { records, total }))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HistoryErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// Delete a record from one side of the ledger
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path((outcome, id)): Path<(String, String)>,
) -> Result<StatusCode, impl IntoResponse> {
    let outcome = match outcome.as_str() {
        "successes" => Outcome::Success,
        "failures" => Outcome::Failure,
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(HistoryErrorResponse {
                    error: format!("Unknown history outcome: {}", other),
                }),
            ));
        }
    };

    match state.history().del(outcome, &id) {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(StoreError::NotFound) => Err((
            StatusCode::NOT_FOUND,
            Json(HistoryErrorResponse {
                error: format!("History record not found: {}", id),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HistoryErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

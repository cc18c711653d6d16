//! Conversion request API handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use pixerd_core::{ConversionRequest, IntakeError, JobKind, SubmittedJob};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a conversion request
#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    /// Path of the source image, as returned by the uploads endpoint
    pub input: String,
    /// The conversion request itself
    #[serde(flatten)]
    pub request: ConversionRequest,
}

/// One accepted job in the submission response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedJobResponse {
    pub job_id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub resolution_width: u32,
    pub resolution_height: u32,
    pub message_id: u64,
}

impl From<SubmittedJob> for SubmittedJobResponse {
    fn from(submitted: SubmittedJob) -> Self {
        Self {
            job_id: submitted.job.id,
            kind: submitted.job.kind,
            resolution_width: submitted.job.resolution.width,
            resolution_height: submitted.job.resolution.height,
            message_id: submitted.message_id,
        }
    }
}

/// Response for an accepted conversion request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequestResponse {
    pub job_count: usize,
    pub jobs: Vec<SubmittedJobResponse>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct RequestErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a conversion request: validate, fan out into jobs, enqueue
pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequestBody>,
) -> Result<(StatusCode, Json<SubmitRequestResponse>), impl IntoResponse> {
    match state.intake().submit(&body.request, &body.input).await {
        Ok(submitted) => {
            let jobs: Vec<SubmittedJobResponse> =
                submitted.into_iter().map(SubmittedJobResponse::from).collect();
            Ok((
                StatusCode::CREATED,
                Json(SubmitRequestResponse {
                    job_count: jobs.len(),
                    jobs,
                }),
            ))
        }
        Err(e @ IntakeError::Request(_)) => Err((
            StatusCode::BAD_REQUEST,
            Json(RequestErrorResponse {
                error: e.to_string(),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RequestErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

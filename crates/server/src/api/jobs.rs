//! Task registry API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use pixerd_core::{Job, JobStatus, RegistryError, StoreError};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status
    pub status: Option<JobStatus>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// List registered jobs with an optional status filter
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, impl IntoResponse> {
    match state.registry().list() {
        Ok(mut jobs) => {
            if let Some(status) = params.status {
                jobs.retain(|job| job.status == status);
            }
            let total = jobs.len();
            Ok(Json(ListJobsResponse { jobs, total }))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(JobErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, impl IntoResponse> {
    match state.registry().get(&id) {
        Ok(job) => Ok(Json(job)),
        Err(RegistryError::Store(StoreError::NotFound)) => Err((
            StatusCode::NOT_FOUND,
            Json(JobErrorResponse {
                error: format!("Job not found: {}", id),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(JobErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

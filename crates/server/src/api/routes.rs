use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, history, jobs, requests, uploads};
use crate::state::AppState;

/// Maximum accepted upload size in bytes (100 MiB).
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Conversion requests
        .route("/requests", post(requests::submit_request))
        // Jobs (task registry)
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        // History ledger
        .route("/history/successes", get(history::list_successes))
        .route("/history/failures", get(history::list_failures))
        .route("/history/{outcome}/{id}", delete(history::delete_record))
        // Uploads
        .route("/uploads", post(uploads::upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
}

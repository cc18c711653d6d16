//! Source image upload handler.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for a stored upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Generated filename inside the uploads directory
    pub filename: String,
    /// Path to pass as `input` when submitting a conversion request
    pub path: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct UploadErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Accept a multipart upload and store it under the uploads directory.
///
/// The stored name embeds the content hash, a fresh id and the
/// client-supplied name (base64url, so any client string is safe on
/// the filesystem): `<sha256>_<uuid>_<name>.<ext>`.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), impl IntoResponse> {
    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(UploadErrorResponse {
                    error: "Multipart body has no file field".to_string(),
                }),
            ));
        }
        Err(e) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(UploadErrorResponse {
                    error: e.to_string(),
                }),
            ));
        }
    };

    let original_name = field.file_name().unwrap_or("upload").to_string();
    let data = match field.bytes().await {
        Ok(data) => data,
        Err(e) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(UploadErrorResponse {
                    error: e.to_string(),
                }),
            ));
        }
    };
    if data.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(UploadErrorResponse {
                error: "Uploaded file is empty".to_string(),
            }),
        ));
    }

    let filename = storage_name(&original_name, &data);
    let uploads_dir = state.uploads_dir();
    let final_path = uploads_dir.join(&filename);

    // Write to a temp name first, then rename into place so a
    // concurrent reader never sees a partial file.
    let tmp_path = uploads_dir.join(format!("{}.tmp", filename));
    let result = async {
        tokio::fs::create_dir_all(&uploads_dir).await?;
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &final_path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(UploadErrorResponse {
                error: format!("Failed to store upload: {}", e),
            }),
        ));
    }

    info!(
        filename,
        bytes = data.len(),
        original = original_name,
        "stored upload"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            path: final_path.display().to_string(),
            filename,
        }),
    ))
}

fn storage_name(original_name: &str, data: &[u8]) -> String {
    let hash = format!("{:x}", Sha256::digest(data));
    let id = Uuid::now_v7().simple().to_string();

    let original = Path::new(original_name);
    let stem = original
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upload");
    let encoded_stem = URL_SAFE_NO_PAD.encode(stem.as_bytes());

    match original.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}_{}.{}", &hash[..16], id, encoded_stem, ext),
        None => format!("{}_{}_{}", &hash[..16], id, encoded_stem),
    }
}

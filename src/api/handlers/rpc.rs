//! Internal service-to-service endpoints. No end-user authentication; the RPC
//! listener is expected to be reachable from inside the cluster only.

use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::load_file;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::metadata::Visibility;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FileRequest {
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct FileIdResponse {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct UserHasFilesRequest {
    pub uid: String,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UserHasFilesResponse {
    pub files_exist: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadFileRequest {
    /// Base64-encoded content.
    pub bytes: String,
    pub file_name: String,
    pub uid: String,
    #[serde(default)]
    pub admin_only: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BinaryFileResponse {
    /// Base64-encoded content.
    pub data: String,
    pub size: u64,
    pub content_type: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn rpc_get_file(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<FileRequest>,
) -> Result<Json<JSend<FileIdResponse>>, ApiError> {
    let file = load_file(&state, req.id)?;
    Ok(JSend::success(FileIdResponse { id: file.id }))
}

/// Whether the user owns any tagged file outside the excluded categories.
pub async fn rpc_user_has_files(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<UserHasFilesRequest>,
) -> Result<Json<JSend<UserHasFilesResponse>>, ApiError> {
    let files = state
        .repo
        .find_admin_visible_by_uid(&req.uid, &req.exclude_categories)?;

    Ok(JSend::success(UserHasFilesResponse {
        files_exist: !files.is_empty(),
    }))
}

pub async fn rpc_upload_file(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<UploadFileRequest>,
) -> Result<Json<JSend<FileIdResponse>>, ApiError> {
    let content = STANDARD
        .decode(req.bytes.as_bytes())
        .map_err(|e| ApiError::bad_request(format!("bytes must be base64: {e}")))?;

    // An empty category is the same as none
    let category = req.category.filter(|c| !c.is_empty());
    let visibility = Visibility::from_flags(req.admin_only, req.private);

    let record = state
        .engine
        .upload_bytes(Bytes::from(content), &req.file_name, &req.uid, visibility, category)
        .await?;

    Ok(JSend::success(FileIdResponse { id: record.id }))
}

pub async fn rpc_download_file(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<FileRequest>,
) -> Result<Json<JSend<BinaryFileResponse>>, ApiError> {
    let file = load_file(&state, req.id)?;
    let data = state.engine.download(&file).await?;

    Ok(JSend::success(BinaryFileResponse {
        data: STANDARD.encode(&data),
        size: file.size,
        content_type: file.content_type,
    }))
}

mod binary;
mod files;
mod health;
mod limited;
mod rpc;
mod users;

use axum::extract::Multipart;
use bytes::Bytes;

use crate::api::response::ApiError;
use crate::metadata::FileRecord;
use crate::AppState;

pub use binary::{get_private_binary, get_public_binary};
pub use files::{
    create_admin_only_file, create_private_file, create_profile_image, create_public_file,
    delete_file, get_file, FileResponse,
};
pub use health::{build_info, health};
pub use limited::{create_limited_private_file, delete_limited_file, get_limited_file};
pub use rpc::{rpc_download_file, rpc_get_file, rpc_upload_file, rpc_user_has_files};
pub use users::list_user_files;

/// Look up a record or fail with `FILE_NOT_FOUND`.
fn load_file(state: &AppState, id: u64) -> Result<FileRecord, ApiError> {
    state.repo.find_by_id(id)?.ok_or_else(|| {
        tracing::warn!(file_id = id, "File not found");
        ApiError::file_not_found()
    })
}

/// Read the `file` field of a multipart upload. Other fields are ignored.
async fn read_file_field(
    multipart: &mut Multipart,
    max_upload_size: u64,
) -> Result<(Bytes, String), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("file field must carry a filename"))?;

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

        if data.len() as u64 > max_upload_size {
            return Err(ApiError::payload_too_large(format!(
                "File exceeds maximum upload size of {max_upload_size} bytes"
            )));
        }

        return Ok((data, filename));
    }

    Err(ApiError::bad_request("file field is required"))
}

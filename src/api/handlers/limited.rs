//! Routes reachable with a temporary token, used while a new user finishes
//! onboarding. Uploads always land as the caller's own private files.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use std::sync::Arc;

use super::files::{authorize_on_file, DeleteResponse, FileResponse};
use super::{load_file, read_file_field};
use crate::api::auth::TmpUser;
use crate::api::response::{ApiError, JSend};
use crate::metadata::Visibility;
use crate::policy::Action;
use crate::AppState;

pub async fn get_limited_file(
    State(state): State<Arc<AppState>>,
    TmpUser(actor): TmpUser,
    Path(id): Path<u64>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = load_file(&state, id)?;
    authorize_on_file(&state, &actor, Action::Read, &file).await?;

    Ok(JSend::success(file.into()))
}

pub async fn delete_limited_file(
    State(state): State<Arc<AppState>>,
    TmpUser(actor): TmpUser,
    Path(id): Path<u64>,
) -> Result<Json<JSend<DeleteResponse>>, ApiError> {
    let file = load_file(&state, id)?;
    authorize_on_file(&state, &actor, Action::Delete, &file).await?;

    state.engine.delete(&file).await?;

    Ok(JSend::success(DeleteResponse { id }))
}

pub async fn create_limited_private_file(
    State(state): State<Arc<AppState>>,
    TmpUser(actor): TmpUser,
    mut multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let (data, filename) = read_file_field(&mut multipart, state.config.max_upload_size).await?;

    let record = state
        .engine
        .upload(data, &filename, &actor.uid, Visibility::Private, None)
        .await?;

    Ok(JSend::success(record.into()))
}

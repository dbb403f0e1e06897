use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use super::{load_file, read_file_field};
use crate::api::auth::CurrentUser;
use crate::api::response::{ApiError, JSend};
use crate::metadata::{BackendKind, FileRecord, Visibility};
use crate::policy::{Action, Actor, Resource, ResourceType};
use crate::profile_image::replace_profile_image;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub content_type: String,
    pub created_at: String,
    pub filename: String,
    pub id: u64,
    pub is_admin_only: bool,
    pub is_private: bool,
    pub path: String,
    pub size: u64,
    pub storage: BackendKind,
    pub updated_at: String,
    pub user_id: String,
}

impl From<FileRecord> for FileResponse {
    fn from(r: FileRecord) -> Self {
        FileResponse {
            is_admin_only: r.is_admin_only(),
            is_private: r.is_private(),
            content_type: r.content_type,
            created_at: r.created_at.to_rfc3339(),
            filename: r.filename,
            id: r.id,
            path: r.path,
            size: r.size,
            storage: r.storage,
            updated_at: r.updated_at.to_rfc3339(),
            user_id: r.user_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<u64>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = load_file(&state, id)?;
    authorize_on_file(&state, &actor, Action::Read, &file).await?;

    Ok(JSend::success(file.into()))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<u64>,
) -> Result<Json<JSend<DeleteResponse>>, ApiError> {
    let file = load_file(&state, id)?;
    authorize_on_file(&state, &actor, Action::Delete, &file).await?;

    state.engine.delete(&file).await?;

    Ok(JSend::success(DeleteResponse { id }))
}

pub async fn create_public_file(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(uid): Path<String>,
    multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    create_for_user(&state, &actor, &uid, multipart, Visibility::Public).await
}

pub async fn create_private_file(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(uid): Path<String>,
    multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    create_for_user(&state, &actor, &uid, multipart, Visibility::Private).await
}

pub async fn create_admin_only_file(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(uid): Path<String>,
    multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    create_for_user(&state, &actor, &uid, multipart, Visibility::AdminOnly).await
}

pub async fn create_profile_image(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let (data, filename) = read_file_field(&mut multipart, state.config.max_upload_size).await?;

    let image = replace_profile_image(
        &state.engine,
        state.repo.as_ref(),
        state.identity.as_ref(),
        &actor,
        data,
        &filename,
    )
    .await?;

    Ok(JSend::success(image.into()))
}

// ============================================================================
// Helpers
// ============================================================================

pub(super) async fn authorize_on_file(
    state: &AppState,
    actor: &Actor,
    action: Action,
    file: &FileRecord,
) -> Result<(), ApiError> {
    let allowed = state
        .policy
        .authorize(actor, action, ResourceType::Files, Some(Resource::File(file)))
        .await;

    if !allowed {
        tracing::warn!(user_id = %actor.uid, file_id = file.id, ?action, "Forbidden");
        return Err(ApiError::forbidden());
    }
    Ok(())
}

/// Resolve the user named in the path and check the caller may act on their
/// files: the owner themselves, or an admin or root.
pub(super) async fn requested_user(
    state: &AppState,
    actor: &Actor,
    uid: &str,
) -> Result<Actor, ApiError> {
    if actor.uid != uid && !actor.role().is_privileged() {
        tracing::warn!(user_id = %actor.uid, requested_uid = %uid, "Not the owner");
        return Err(ApiError::forbidden());
    }

    state.identity.get_by_uid(uid).await.map_err(|e| {
        tracing::warn!(user_id = %actor.uid, requested_uid = %uid, error = %e, "Requested user lookup failed");
        ApiError::forbidden()
    })
}

fn upload_resource(visibility: Visibility) -> ResourceType {
    match visibility {
        Visibility::Public => ResourceType::UploadPublic,
        Visibility::Private => ResourceType::UploadPrivate,
        Visibility::AdminOnly => ResourceType::UploadAdminOnly,
    }
}

async fn create_for_user(
    state: &AppState,
    actor: &Actor,
    uid: &str,
    mut multipart: Multipart,
    visibility: Visibility,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let owner = requested_user(state, actor, uid).await?;

    let resource_type = upload_resource(visibility);
    let allowed = state
        .policy
        .authorize(actor, Action::Create, resource_type, Some(Resource::User(&owner)))
        .await;
    if !allowed {
        tracing::warn!(user_id = %actor.uid, owner_id = %owner.uid, ?resource_type, "Upload forbidden");
        return Err(ApiError::forbidden());
    }

    let (data, filename) = read_file_field(&mut multipart, state.config.max_upload_size).await?;

    let record = state
        .engine
        .upload(data, &filename, &owner.uid, visibility, None)
        .await?;

    Ok(JSend::success(record.into()))
}

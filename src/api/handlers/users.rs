use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::files::requested_user;
use super::FileResponse;
use crate::api::auth::CurrentUser;
use crate::api::response::{ApiError, AppQuery, JSendPaginated, Pagination};
use crate::metadata::{ListParams, SortOrder};
use crate::policy::{Action, Resource, ResourceType};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default)]
    pub sort: SortOrder,
    /// Zero returns every file.
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

/// Files owned by `uid`, oldest first unless `sort=desc`. Admin-only files
/// are hidden from callers without a privileged role.
pub async fn list_user_files(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(uid): Path<String>,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    let owner = requested_user(&state, &actor, &uid).await?;

    let allowed = state
        .policy
        .authorize(
            &actor,
            Action::ReadList,
            ResourceType::Files,
            Some(Resource::User(&owner)),
        )
        .await;
    if !allowed {
        tracing::warn!(user_id = %actor.uid, owner_id = %owner.uid, "Listing forbidden");
        return Err(ApiError::forbidden());
    }

    let filter = ListParams {
        user_id: Some(owner.uid.clone()),
        exclude_admin_only: !actor.role().is_privileged(),
        sort: params.sort,
        limit: 0,
        offset: 0,
    };
    let total = state.repo.list(&filter)?.len() as u64;

    let page = ListParams {
        limit: params.limit as usize,
        offset: params.offset as usize,
        ..filter
    };
    let items = state
        .repo
        .list(&page)?
        .into_iter()
        .map(FileResponse::from)
        .collect();

    Ok(JSendPaginated::success(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

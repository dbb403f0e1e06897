use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use super::load_file;
use crate::api::auth::{CurrentUser, MaybeUser};
use crate::api::response::ApiError;
use crate::policy::{Action, Actor, Resource, ResourceType};
use crate::AppState;

/// Route: GET /private/v1/storage/bin/:id
pub async fn get_private_binary(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    serve_binary(&state, Some(actor), id).await
}

/// Route: GET /public/v1/storage/bin/:id
pub async fn get_public_binary(
    State(state): State<Arc<AppState>>,
    MaybeUser(actor): MaybeUser,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    serve_binary(&state, actor, id).await
}

/// Public files are served to anyone; private and admin-only files need an
/// actor the policy allows to read them.
async fn serve_binary(state: &AppState, actor: Option<Actor>, id: u64) -> Result<Response, ApiError> {
    let file = load_file(state, id)?;

    if file.is_private() {
        let allowed = match &actor {
            Some(actor) => {
                state
                    .policy
                    .authorize(actor, Action::Read, ResourceType::Files, Some(Resource::File(&file)))
                    .await
            }
            None => false,
        };
        if !allowed {
            tracing::warn!(
                file_id = id,
                user_id = actor.as_ref().map(|a| a.uid.as_str()).unwrap_or(""),
                is_admin_only = file.is_admin_only(),
                "Binary download forbidden"
            );
            return Err(ApiError::forbidden());
        }
    }

    let data = state.engine.download(&file).await?;

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.content_type
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, header::HeaderValue::from(file.size));

    headers.insert(header::CONTENT_DISPOSITION, attachment_disposition(&file.filename));

    Ok(response)
}

/// An `attachment` disposition for any stored name. Names that are not plain
/// printable ASCII get a sanitized `filename` plus the exact name as
/// `filename*` (RFC 5987).
fn attachment_disposition(filename: &str) -> header::HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let value = if fallback == filename {
        format!("attachment; filename=\"{filename}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    };

    header::HeaderValue::from_str(&value)
        .unwrap_or_else(|_| header::HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_are_quoted_as_is() {
        assert_eq!(
            attachment_disposition("1704067200-report.pdf"),
            "attachment; filename=\"1704067200-report.pdf\""
        );
    }

    #[test]
    fn test_quotes_and_unicode_are_encoded() {
        assert_eq!(
            attachment_disposition("1-say \"hi\".txt"),
            "attachment; filename=\"1-say _hi_.txt\"; filename*=UTF-8''1-say%20%22hi%22.txt"
        );
        assert_eq!(
            attachment_disposition("1-r\u{e9}sum\u{e9}.pdf"),
            "attachment; filename=\"1-r_sum_.pdf\"; filename*=UTF-8''1-r%C3%A9sum%C3%A9.pdf"
        );
        assert_eq!(
            attachment_disposition("1-tab\there.txt"),
            "attachment; filename=\"1-tab_here.txt\"; filename*=UTF-8''1-tab%09here.txt"
        );
    }
}

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::sync::Arc;

use crate::api::response::ApiError;
use crate::policy::Actor;
use crate::AppState;

/// The authenticated caller. Rejects with 401 when the bearer token is
/// missing or not accepted by the users service.
pub struct CurrentUser(pub Actor);

/// The caller if a valid bearer token was presented, anonymous otherwise.
pub struct MaybeUser(pub Option<Actor>);

/// A caller holding a temporary token in `X-Tmp-Auth`, accepted only on the
/// limited routes.
pub struct TmpUser(pub Actor);

const TMP_AUTH_HEADER: &str = "x-tmp-auth";

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn tmp_auth_token(headers: &HeaderMap) -> Option<&str> {
    let token = headers.get(TMP_AUTH_HEADER)?.to_str().ok()?.trim();
    (!token.is_empty()).then_some(token)
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, ApiError> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(MaybeUser(None));
        };

        match state.identity.validate_access_token(token).await {
            Ok(actor) => Ok(MaybeUser(Some(actor))),
            Err(e) => {
                tracing::warn!(error = %e, "Access token rejected");
                Ok(MaybeUser(None))
            }
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, ApiError> {
        let MaybeUser(actor) = MaybeUser::from_request_parts(parts, state).await?;
        actor
            .map(CurrentUser)
            .ok_or_else(|| ApiError::unauthorized("Valid access token required"))
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for TmpUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, ApiError> {
        let token = tmp_auth_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Temporary auth token required"))?;

        state
            .identity
            .validate_tmp_auth_token(token)
            .await
            .map(TmpUser)
            .map_err(|e| {
                tracing::warn!(error = %e, "Temporary auth token rejected");
                ApiError::unauthorized("Valid temporary auth token required")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_tmp_auth_token() {
        let mut map = HeaderMap::new();
        assert_eq!(tmp_auth_token(&map), None);
        map.insert(TMP_AUTH_HEADER, HeaderValue::from_static("  "));
        assert_eq!(tmp_auth_token(&map), None);
        map.insert(TMP_AUTH_HEADER, HeaderValue::from_static("tmp-abc"));
        assert_eq!(tmp_auth_token(&map), Some("tmp-abc"));
        assert_eq!(tmp_auth_token(&headers("Bearer tmp-abc")), None);
    }
}

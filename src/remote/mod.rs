//! Clients for the users, permissions and settings services.
//!
//! Each service is reached through a narrow trait so the policy engine and the
//! storage engine never depend on the transport. The HTTP implementations
//! speak Twirp-style JSON: `POST {base}/twirp/{service}/{method}`.

mod permissions;
mod settings;
mod users;

pub use permissions::HttpPermissionChecker;
pub use settings::{parse_megabytes, HttpSettingsService};
pub use users::HttpIdentityService;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::policy::Actor;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} responded with {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Invalid setting {path}: {value:?}")]
    InvalidSetting { path: String, value: String },
}

/// Per-user byte limits for private and admin-only files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLimits {
    pub total_limit_bytes: u64,
    pub file_size_limit_bytes: u64,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn get_by_uid(&self, uid: &str) -> Result<Actor, RemoteError>;
    async fn update_profile_image_id(&self, uid: &str, file_id: u64) -> Result<(), RemoteError>;
    async fn validate_access_token(&self, token: &str) -> Result<Actor, RemoteError>;
    /// Resolve a short-lived token issued for the limited upload routes.
    async fn validate_tmp_auth_token(&self, token: &str) -> Result<Actor, RemoteError>;
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Whether the user holds the named permission.
    async fn check(&self, uid: &str, permission_key: &str) -> Result<bool, RemoteError>;
}

#[async_trait]
pub trait QuotaOracle: Send + Sync {
    /// Current limits, fetched fresh on every call.
    async fn storage_limits(&self) -> Result<StorageLimits, RemoteError>;
}

/// Build the shared reqwest client; request timeouts for every remote lookup
/// are enforced here.
pub fn http_client(timeout: Duration) -> Result<Client, RemoteError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// A Twirp JSON endpoint rooted at `base_url`.
#[derive(Clone)]
pub(crate) struct TwirpEndpoint {
    client: Client,
    base_url: String,
    service: &'static str,
}

impl TwirpEndpoint {
    pub(crate) fn new(client: Client, base_url: &str, service: &'static str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/twirp/{}/{}", self.base_url, self.service, method)
    }

    pub(crate) async fn call<Req, Resp>(&self, method: &str, req: &Req) -> Result<Resp, RemoteError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.method_url(method))
            .json(req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                service: self.service,
                status,
                body,
            });
        }

        Ok(resp.json().await?)
    }
}

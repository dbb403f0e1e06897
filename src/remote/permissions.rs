use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{PermissionChecker, RemoteError, TwirpEndpoint};

/// Permissions service client.
pub struct HttpPermissionChecker {
    endpoint: TwirpEndpoint,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PermissionRequest<'a> {
    user_id: &'a str,
    action_key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionResponse {
    #[serde(default)]
    is_allowed: bool,
}

impl HttpPermissionChecker {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            endpoint: TwirpEndpoint::new(client, base_url, "permissions.PermissionChecker"),
        }
    }
}

#[async_trait]
impl PermissionChecker for HttpPermissionChecker {
    async fn check(&self, uid: &str, permission_key: &str) -> Result<bool, RemoteError> {
        let req = PermissionRequest {
            user_id: uid,
            action_key: permission_key,
        };
        let resp: PermissionResponse = self.endpoint.call("Check", &req).await?;
        Ok(resp.is_allowed)
    }
}

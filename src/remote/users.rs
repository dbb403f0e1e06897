use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{IdentityService, RemoteError, TwirpEndpoint};
use crate::policy::Actor;

/// Users service client.
pub struct HttpIdentityService {
    endpoint: TwirpEndpoint,
}

#[derive(Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tmp_auth_token: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileImageRequest<'a> {
    uid: &'a str,
    image_id: u64,
}

#[derive(Deserialize)]
struct UserResponse {
    user: Actor,
}

#[derive(Deserialize)]
struct Empty {}

impl HttpIdentityService {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            endpoint: TwirpEndpoint::new(client, base_url, "users.UserHandler"),
        }
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn get_by_uid(&self, uid: &str) -> Result<Actor, RemoteError> {
        let req = UserRequest {
            uid: Some(uid),
            ..Default::default()
        };
        let resp: UserResponse = self.endpoint.call("GetByUID", &req).await?;
        Ok(resp.user)
    }

    async fn update_profile_image_id(&self, uid: &str, file_id: u64) -> Result<(), RemoteError> {
        let req = UpdateProfileImageRequest {
            uid,
            image_id: file_id,
        };
        let _: Empty = self.endpoint.call("UpdateProfileImageID", &req).await?;
        Ok(())
    }

    async fn validate_access_token(&self, token: &str) -> Result<Actor, RemoteError> {
        let req = UserRequest {
            access_token: Some(token),
            ..Default::default()
        };
        let resp: UserResponse = self.endpoint.call("ValidateAccessToken", &req).await?;
        Ok(resp.user)
    }

    async fn validate_tmp_auth_token(&self, token: &str) -> Result<Actor, RemoteError> {
        let req = UserRequest {
            tmp_auth_token: Some(token),
            ..Default::default()
        };
        let resp: UserResponse = self.endpoint.call("ValidateTmpAuthToken", &req).await?;
        Ok(resp.user)
    }
}

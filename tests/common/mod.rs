//! Shared helpers for HTTP-level tests: in-memory remote services and a
//! fully wired application state over a scratch directory.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use files_service::config::{Config, CorsConfig, ServerConfig, ServicesConfig, StorageConfig};
use files_service::engine::StorageEngine;
use files_service::metadata::{BackendKind, Database, FileRepository};
use files_service::policy::{AccessPolicy, Actor};
use files_service::remote::{
    IdentityService, PermissionChecker, QuotaOracle, RemoteError, StorageLimits,
};
use files_service::storage::FilesystemBackend;
use files_service::AppState;
use http_body_util::BodyExt;

pub const BOUNDARY: &str = "files-service-test-boundary";

fn remote_error(service: &'static str) -> RemoteError {
    RemoteError::Status {
        service,
        status: reqwest::StatusCode::NOT_FOUND,
        body: "not found".to_string(),
    }
}

/// Access tokens are the uid prefixed with `token-`, temporary tokens with
/// `tmp-`.
#[derive(Clone, Default)]
pub struct StubUsers {
    users: Arc<Mutex<HashMap<String, Actor>>>,
}

impl StubUsers {
    pub fn new(users: impl IntoIterator<Item = Actor>) -> Self {
        let stub = Self::default();
        for user in users {
            stub.users.lock().unwrap().insert(user.uid.clone(), user);
        }
        stub
    }

    pub fn get(&self, uid: &str) -> Option<Actor> {
        self.users.lock().unwrap().get(uid).cloned()
    }
}

#[async_trait]
impl IdentityService for StubUsers {
    async fn get_by_uid(&self, uid: &str) -> Result<Actor, RemoteError> {
        self.get(uid).ok_or_else(|| remote_error("users"))
    }

    async fn update_profile_image_id(&self, uid: &str, file_id: u64) -> Result<(), RemoteError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(uid).ok_or_else(|| remote_error("users"))?;
        user.profile_image_id = Some(file_id);
        Ok(())
    }

    async fn validate_access_token(&self, token: &str) -> Result<Actor, RemoteError> {
        token
            .strip_prefix("token-")
            .and_then(|uid| self.get(uid))
            .ok_or_else(|| remote_error("users"))
    }

    async fn validate_tmp_auth_token(&self, token: &str) -> Result<Actor, RemoteError> {
        token
            .strip_prefix("tmp-")
            .and_then(|uid| self.get(uid))
            .ok_or_else(|| remote_error("users"))
    }
}

#[derive(Default)]
pub struct StubPermissions {
    granted: HashSet<(String, String)>,
}

impl StubPermissions {
    pub fn granting<'a>(grants: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            granted: grants
                .into_iter()
                .map(|(uid, key)| (uid.to_string(), key.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl PermissionChecker for StubPermissions {
    async fn check(&self, uid: &str, permission_key: &str) -> Result<bool, RemoteError> {
        Ok(self
            .granted
            .contains(&(uid.to_string(), permission_key.to_string())))
    }
}

pub struct StubSettings(pub StorageLimits);

#[async_trait]
impl QuotaOracle for StubSettings {
    async fn storage_limits(&self) -> Result<StorageLimits, RemoteError> {
        Ok(self.0)
    }
}

pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub db: Database,
    pub users: StubUsers,
    pub state: Arc<AppState>,
}

pub fn default_users() -> Vec<Actor> {
    vec![
        Actor::new("root-1", "root"),
        Actor::new("admin-1", "admin"),
        Actor::new("admin-2", "admin"),
        Actor::new("client-1", "client"),
        Actor::new("client-2", "client"),
    ]
}

/// App with the default users, `admin-1` allowed to view and modify client
/// files, and a 1 KiB per-user quota.
pub fn test_app() -> TestApp {
    test_app_with(
        StubPermissions::granting([
            ("admin-1", "view_user_profiles"),
            ("admin-1", "modify_user_profiles"),
        ]),
        StorageLimits {
            total_limit_bytes: 1024,
            file_size_limit_bytes: 512,
        },
    )
}

pub fn test_app_with(permissions: StubPermissions, limits: StorageLimits) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let files_dir = dir.path().join("files");

    let config = Config {
        cors: CorsConfig::default(),
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
            rpc_bind_address: "127.0.0.1:0".to_string(),
        },
        services: ServicesConfig::default(),
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
            ..StorageConfig::default()
        },
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let repo: Arc<dyn FileRepository> = Arc::new(db.clone());
    let filesystem =
        FilesystemBackend::new(&files_dir, Arc::clone(&repo)).expect("Failed to create test backend");

    let users = StubUsers::new(default_users());
    let engine = StorageEngine::new(BackendKind::Local, Arc::clone(&repo), Arc::new(StubSettings(limits)))
        .with_backend(Arc::new(filesystem));
    let policy = AccessPolicy::new(Arc::new(users.clone()), Arc::new(permissions));

    let state = Arc::new(AppState {
        config,
        engine,
        identity: Arc::new(users.clone()),
        policy,
        repo,
    });

    TestApp {
        dir,
        db,
        users,
        state,
    }
}

/// A multipart body with a single `file` field.
pub fn multipart_body(filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(uri: &str, uid: &str, filename: &str, content: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer token-{uid}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(filename, content)))
        .unwrap()
}

/// A multipart upload carrying a temporary token instead of a bearer token.
pub fn tmp_upload_request(uri: &str, uid: &str, filename: &str, content: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("X-Tmp-Auth", format!("tmp-{uid}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(filename, content)))
        .unwrap()
}

pub fn tmp_authed(method: &str, uri: &str, uid: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Tmp-Auth", format!("tmp-{uid}"))
        .body(Body::empty())
        .unwrap()
}

pub fn authed(method: &str, uri: &str, uid: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer token-{uid}"))
        .body(Body::empty())
        .unwrap()
}

pub fn anonymous(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

//! In-memory stand-ins for the remote services, the object store and a
//! repository that can be told to fail.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::metadata::{
    BackendKind, Database, DatabaseError, FileRecord, FileRepository, ListParams, NewFile,
    OrphanRecord, Visibility,
};
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::policy::Actor;
use crate::remote::{IdentityService, PermissionChecker, QuotaOracle, RemoteError, StorageLimits};

fn unavailable(service: &'static str) -> RemoteError {
    RemoteError::Status {
        service,
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        body: "unavailable".to_string(),
    }
}

fn not_found(service: &'static str, what: &str) -> RemoteError {
    RemoteError::Status {
        service,
        status: reqwest::StatusCode::NOT_FOUND,
        body: what.to_string(),
    }
}

pub fn sample_record(id: u64, owner: &str) -> FileRecord {
    let now = Utc::now();
    FileRecord {
        id,
        user_id: owner.to_string(),
        storage: BackendKind::Local,
        path: "txt/2024-01-01".to_string(),
        filename: "1704067200-sample.txt".to_string(),
        bucket: None,
        content_type: "text/plain; charset=utf-8".to_string(),
        size: 6,
        category: None,
        visibility: Visibility::Public,
        created_at: now,
        updated_at: now,
    }
}

/// Users keyed by uid; access tokens are the uid prefixed with `token-`,
/// temporary tokens the uid prefixed with `tmp-`.
#[derive(Clone, Default)]
pub struct FakeIdentity {
    users: Arc<Mutex<HashMap<String, Actor>>>,
    fail_updates: Arc<AtomicBool>,
}

impl FakeIdentity {
    pub fn with_users(users: impl IntoIterator<Item = Actor>) -> Self {
        let identity = Self::default();
        {
            let mut map = identity.users.lock().unwrap();
            for user in users {
                map.insert(user.uid.clone(), user);
            }
        }
        identity
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn user(&self, uid: &str) -> Option<Actor> {
        self.users.lock().unwrap().get(uid).cloned()
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn get_by_uid(&self, uid: &str) -> Result<Actor, RemoteError> {
        self.user(uid).ok_or_else(|| not_found("users", uid))
    }

    async fn update_profile_image_id(&self, uid: &str, file_id: u64) -> Result<(), RemoteError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(unavailable("users"));
        }
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(uid).ok_or_else(|| not_found("users", uid))?;
        user.profile_image_id = Some(file_id);
        Ok(())
    }

    async fn validate_access_token(&self, token: &str) -> Result<Actor, RemoteError> {
        token
            .strip_prefix("token-")
            .and_then(|uid| self.user(uid))
            .ok_or_else(|| not_found("users", "invalid token"))
    }

    async fn validate_tmp_auth_token(&self, token: &str) -> Result<Actor, RemoteError> {
        token
            .strip_prefix("tmp-")
            .and_then(|uid| self.user(uid))
            .ok_or_else(|| not_found("users", "invalid tmp token"))
    }
}

#[derive(Default)]
pub struct FakePermissions {
    granted: HashSet<(String, String)>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FakePermissions {
    pub fn granting<'a>(grants: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            granted: grants
                .into_iter()
                .map(|(uid, key)| (uid.to_string(), key.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Counter of remote checks made so far.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl PermissionChecker for FakePermissions {
    async fn check(&self, uid: &str, permission_key: &str) -> Result<bool, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(unavailable("permissions"));
        }
        Ok(self
            .granted
            .contains(&(uid.to_string(), permission_key.to_string())))
    }
}

pub struct FakeQuota {
    limits: Option<StorageLimits>,
}

impl FakeQuota {
    pub fn new(total_limit_bytes: u64, file_size_limit_bytes: u64) -> Self {
        Self {
            limits: Some(StorageLimits {
                total_limit_bytes,
                file_size_limit_bytes,
            }),
        }
    }

    pub fn failing() -> Self {
        Self { limits: None }
    }
}

#[async_trait]
impl QuotaOracle for FakeQuota {
    async fn storage_limits(&self) -> Result<StorageLimits, RemoteError> {
        self.limits.ok_or_else(|| unavailable("settings"))
    }
}

type Objects = Arc<Mutex<HashMap<(String, String), (Bytes, String)>>>;

/// Object store kept in memory. Clones made with [`MemoryStore::with_bucket`]
/// share the same objects.
pub struct MemoryStore {
    bucket: String,
    objects: Objects,
    fail_deletes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Objects::default(),
            fail_deletes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_bucket(&self, bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Arc::clone(&self.objects),
            fail_deletes: Arc::clone(&self.fail_deletes),
        }
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn content_type_of(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(_, content_type)| content_type.clone())
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let mut objects = self.objects.lock().unwrap();
        let entry = (bucket.to_string(), key.to_string());
        if objects.contains_key(&entry) {
            return Err(ObjectStoreError::AlreadyExists(key.to_string()));
        }
        objects.insert(entry, (data, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(data, _)| data.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("delete refused".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

/// Delegates to a real [`Database`] but can be switched to reject creates.
pub struct FailingRepository {
    db: Database,
    fail_creates: AtomicBool,
}

impl FailingRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            fail_creates: AtomicBool::new(false),
        }
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }
}

impl FileRepository for FailingRepository {
    fn create(&self, file: NewFile) -> Result<FileRecord, DatabaseError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(DatabaseError::Io(std::io::Error::other("disk full")));
        }
        self.db.create(file)
    }

    fn update(&self, file: &FileRecord) -> Result<FileRecord, DatabaseError> {
        self.db.update(file)
    }

    fn delete(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        FileRepository::delete(&self.db, file)
    }

    fn find_by_id(&self, id: u64) -> Result<Option<FileRecord>, DatabaseError> {
        self.db.find_by_id(id)
    }

    fn find_admin_visible_by_uid(
        &self,
        user_id: &str,
        excluded_categories: &[String],
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        self.db.find_admin_visible_by_uid(user_id, excluded_categories)
    }

    fn find_client_visible_by_uid(&self, user_id: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        self.db.find_client_visible_by_uid(user_id)
    }

    fn total_size_of_user_files(&self, user_id: &str) -> Result<u64, DatabaseError> {
        FileRepository::total_size_of_user_files(&self.db, user_id)
    }

    fn list(&self, params: &ListParams) -> Result<Vec<FileRecord>, DatabaseError> {
        self.db.list(params)
    }

    fn record_orphan(&self, orphan: &OrphanRecord) -> Result<(), DatabaseError> {
        FileRepository::record_orphan(&self.db, orphan)
    }
}

//! Physical storage backends.
//!
//! A backend owns both halves of a file: the bytes on its medium and the
//! metadata row in the repository. Uploads write bytes first and persist the
//! row second; when the row cannot be written the bytes are removed again.

mod filesystem;
mod object;
mod placement;
mod sniff;

pub use filesystem::FilesystemBackend;
pub use object::ObjectStoreBackend;
pub use placement::{extension_dir, Placement};
pub use sniff::detect_content_type;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use thiserror::Error;

use crate::metadata::{
    BackendKind, DatabaseError, FileRecord, FileRepository, OrphanRecord, Visibility,
};
use crate::object_store::ObjectStoreError;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object store error: {0}")]
    ObjectStore(ObjectStoreError),
    #[error("Content not found: {0}")]
    NotFound(String),
    #[error("Content type {0} is not allowed")]
    UnsupportedContentType(String),
    #[error("Every candidate key for {0} is already taken")]
    PlacementExhausted(String),
    #[error("Failed to persist file metadata: {0}")]
    Persistence(#[from] DatabaseError),
}

impl From<ObjectStoreError> for BackendError {
    fn from(e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::NotFound(key) => BackendError::NotFound(key),
            other => BackendError::ObjectStore(other),
        }
    }
}

/// An upload as handed to a backend.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub content: Bytes,
    /// Client-supplied name; only its final component is kept.
    pub filename: String,
    pub owner_id: String,
    pub visibility: Visibility,
    /// Rejects the upload unless the sniffed content type matches.
    pub content_type_filter: Option<Regex>,
    pub category: Option<String>,
}

impl NewUpload {
    pub fn new(
        content: Bytes,
        filename: impl Into<String>,
        owner_id: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        Self {
            content,
            filename: filename.into(),
            owner_id: owner_id.into(),
            visibility,
            content_type_filter: None,
            category: None,
        }
    }

    pub fn with_content_type_filter(mut self, filter: Regex) -> Self {
        self.content_type_filter = Some(filter);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Store the bytes and persist a record for them. On success both exist;
    /// on failure neither does, unless the cleanup itself failed, in which
    /// case the object is recorded as an orphan.
    async fn upload(&self, upload: NewUpload) -> Result<FileRecord, BackendError>;

    /// Remove the bytes, then the record. A failure removing the bytes leaves
    /// the record in place.
    async fn delete(&self, file: &FileRecord) -> Result<(), BackendError>;

    async fn download(&self, file: &FileRecord) -> Result<Bytes, BackendError>;
}

/// How many consecutive seconds an upload may move forward when its key is
/// already taken.
const PLACEMENT_ATTEMPTS: i64 = 5;

/// Sniffed content type and candidate locations of an upload.
pub(crate) struct PreparedUpload {
    pub content_type: String,
    name: String,
    now: DateTime<Utc>,
}

impl PreparedUpload {
    /// Keys to try in order, one second apart. Backends create objects
    /// exclusively and move on to the next candidate when a key exists.
    pub fn placements(&self) -> impl Iterator<Item = Placement> + '_ {
        (0..PLACEMENT_ATTEMPTS)
            .map(|offset| Placement::new(&self.name, self.now + TimeDelta::seconds(offset)))
    }
}

pub(crate) fn prepare(upload: &NewUpload, now: DateTime<Utc>) -> Result<PreparedUpload, BackendError> {
    let content_type = detect_content_type(&upload.content);

    if let Some(filter) = &upload.content_type_filter {
        if !filter.is_match(&content_type) {
            return Err(BackendError::UnsupportedContentType(content_type));
        }
    }

    Ok(PreparedUpload {
        content_type,
        name: upload.filename.clone(),
        now,
    })
}

/// Log and remember an object that is stored but has no metadata row.
pub(crate) fn report_orphan(
    repo: &dyn FileRepository,
    storage: BackendKind,
    bucket: Option<String>,
    key: String,
    cleanup_error: &dyn std::fmt::Display,
) {
    tracing::error!(
        %storage,
        bucket = bucket.as_deref().unwrap_or(""),
        key = %key,
        error = %cleanup_error,
        "Compensating delete failed, object is orphaned"
    );

    let orphan = OrphanRecord {
        storage,
        bucket,
        key,
        recorded_at: Utc::now(),
    };
    if let Err(e) = repo.record_orphan(&orphan) {
        tracing::error!(key = %orphan.key, error = %e, "Failed to record orphaned object");
    }
}

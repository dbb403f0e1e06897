//! Storage engine: backend selection, quota enforcement and the
//! upload/delete/download entry points used by the HTTP and RPC surfaces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use regex::Regex;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::metadata::{BackendKind, DatabaseError, FileRecord, FileRepository, Visibility};
use crate::remote::{QuotaOracle, RemoteError};
use crate::storage::{BackendError, NewUpload, StorageBackend};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("No storage backend registered for default kind '{0}'")]
    Configuration(BackendKind),
    #[error("Not enough space in files storage")]
    QuotaExceeded { used: u64, size: u64, limit: u64 },
    #[error("File is too large")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("Content type {0} is not allowed")]
    UnsupportedContentType(String),
    #[error("Storage backend '{0}' not found")]
    BackendNotFound(BackendKind),
    #[error("File content not found")]
    ContentNotFound,
    #[error("Storage I/O error: {0}")]
    PhysicalIo(String),
    #[error("Metadata persistence error: {0}")]
    Persistence(#[from] DatabaseError),
    #[error("Remote lookup failed: {0}")]
    RemoteLookup(#[from] RemoteError),
}

impl StorageError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::Configuration(_) => "STORAGE_NOT_CONFIGURED",
            StorageError::QuotaExceeded { .. } => "NOT_ENOUGH_SPACE_IN_FILES_STORAGE",
            StorageError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            StorageError::UnsupportedContentType(_) => "UNSUPPORTED_CONTENT_TYPE",
            StorageError::BackendNotFound(_) => "STORAGE_NOT_FOUND",
            StorageError::ContentNotFound => "FILE_CONTENT_NOT_FOUND",
            StorageError::PhysicalIo(_) => "STORAGE_IO_ERROR",
            StorageError::Persistence(_) => "METADATA_ERROR",
            StorageError::RemoteLookup(_) => "REMOTE_LOOKUP_FAILED",
        }
    }
}

impl From<BackendError> for StorageError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::UnsupportedContentType(ct) => StorageError::UnsupportedContentType(ct),
            BackendError::NotFound(_) => StorageError::ContentNotFound,
            BackendError::Persistence(e) => StorageError::Persistence(e),
            BackendError::Io(e) => StorageError::PhysicalIo(e.to_string()),
            BackendError::ObjectStore(e) => StorageError::PhysicalIo(e.to_string()),
            e @ BackendError::PlacementExhausted(_) => StorageError::PhysicalIo(e.to_string()),
        }
    }
}

/// Per-user async locks. An entry lives only while someone holds or waits
/// for it.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    async fn lock(&self, user_id: &str) -> UserLockGuard<'_> {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(map.entry(user_id.to_string()).or_default())
        };
        let guard = entry.lock_owned().await;
        UserLockGuard {
            locks: self,
            user_id: user_id.to_string(),
            guard: Some(guard),
        }
    }
}

struct UserLockGuard<'a> {
    locks: &'a UserLocks,
    user_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(guard) = self.guard.take() {
            // The map and this guard are the only holders: nobody is waiting
            let idle = map
                .get(&self.user_id)
                .is_some_and(|entry| Arc::strong_count(entry) == 2);
            if idle {
                map.remove(&self.user_id);
            }
            drop(guard);
        }
    }
}

/// Routes uploads to the configured default backend, and reads and deletes
/// to whichever backend a record names.
pub struct StorageEngine {
    backends: HashMap<BackendKind, Arc<dyn StorageBackend>>,
    default_backend: BackendKind,
    repo: Arc<dyn FileRepository>,
    quota: Arc<dyn QuotaOracle>,
    user_locks: UserLocks,
}

impl StorageEngine {
    pub fn new(
        default_backend: BackendKind,
        repo: Arc<dyn FileRepository>,
        quota: Arc<dyn QuotaOracle>,
    ) -> Self {
        Self {
            backends: HashMap::new(),
            default_backend,
            repo,
            quota,
            user_locks: UserLocks::default(),
        }
    }

    /// Register a backend under its own kind, replacing any previous one.
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    pub fn default_backend(&self) -> BackendKind {
        self.default_backend
    }

    /// Store a user upload on the default backend. Private and admin-only
    /// uploads count against the owner's quota.
    pub async fn upload(
        &self,
        content: Bytes,
        filename: &str,
        owner_id: &str,
        visibility: Visibility,
        content_type_filter: Option<Regex>,
    ) -> Result<FileRecord, StorageError> {
        let mut upload = NewUpload::new(content, filename, owner_id, visibility);
        upload.content_type_filter = content_type_filter;
        self.store(upload).await
    }

    /// Store bytes handed over by another service, optionally tagged with a
    /// category.
    pub async fn upload_bytes(
        &self,
        content: Bytes,
        filename: &str,
        owner_id: &str,
        visibility: Visibility,
        category: Option<String>,
    ) -> Result<FileRecord, StorageError> {
        let mut upload = NewUpload::new(content, filename, owner_id, visibility);
        upload.category = category;
        self.store(upload).await
    }

    async fn store(&self, upload: NewUpload) -> Result<FileRecord, StorageError> {
        let backend = self
            .backends
            .get(&self.default_backend)
            .ok_or(StorageError::Configuration(self.default_backend))?;

        // Quota check and write must not interleave with another upload
        // by the same owner
        let _guard = if upload.visibility.is_private() {
            let guard = self.user_locks.lock(&upload.owner_id).await;
            self.check_quota(&upload.owner_id, upload.size()).await?;
            Some(guard)
        } else {
            None
        };

        let owner_id = upload.owner_id.clone();
        let filename = upload.filename.clone();
        let record = backend.upload(upload).await.map_err(|e| {
            log_backend_error("upload", &e);
            StorageError::from(e)
        })?;

        tracing::info!(
            file_id = record.id,
            owner_id = %owner_id,
            original_name = %filename,
            storage = %record.storage,
            size = record.size,
            content_type = %record.content_type,
            "File stored"
        );

        Ok(record)
    }

    async fn check_quota(&self, owner_id: &str, size: u64) -> Result<(), StorageError> {
        let used = self.repo.total_size_of_user_files(owner_id)?;
        let limits = self.quota.storage_limits().await.map_err(|e| {
            tracing::error!(owner_id, error = %e, "Failed to fetch storage limits");
            e
        })?;

        if size > limits.file_size_limit_bytes {
            return Err(StorageError::FileTooLarge {
                size,
                limit: limits.file_size_limit_bytes,
            });
        }

        if used.saturating_add(size) > limits.total_limit_bytes {
            return Err(StorageError::QuotaExceeded {
                used,
                size,
                limit: limits.total_limit_bytes,
            });
        }

        Ok(())
    }

    /// Delete a file through the backend that stored it.
    pub async fn delete(&self, file: &FileRecord) -> Result<(), StorageError> {
        let backend = self.backend_for(file)?;
        backend.delete(file).await.map_err(|e| {
            log_backend_error("delete", &e);
            StorageError::from(e)
        })?;

        tracing::info!(file_id = file.id, storage = %file.storage, "File deleted");
        Ok(())
    }

    /// Read a file's bytes from the backend that stored it.
    pub async fn download(&self, file: &FileRecord) -> Result<Bytes, StorageError> {
        let backend = self.backend_for(file)?;
        backend.download(file).await.map_err(|e| {
            log_backend_error("download", &e);
            StorageError::from(e)
        })
    }

    fn backend_for(&self, file: &FileRecord) -> Result<&Arc<dyn StorageBackend>, StorageError> {
        self.backends.get(&file.storage).ok_or_else(|| {
            tracing::error!(file_id = file.id, storage = %file.storage, "No backend for stored file");
            StorageError::BackendNotFound(file.storage)
        })
    }
}

fn log_backend_error(operation: &'static str, e: &BackendError) {
    match e {
        BackendError::UnsupportedContentType(_) | BackendError::NotFound(_) => {
            tracing::warn!(operation, error = %e, "Storage operation rejected");
        }
        _ => tracing::error!(operation, error = %e, "Storage operation failed"),
    }
}

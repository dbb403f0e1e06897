use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;

use super::{prepare, report_orphan, BackendError, NewUpload, StorageBackend};
use crate::metadata::{BackendKind, FileRecord, FileRepository, NewFile};
use crate::object_store::{ObjectStore, ObjectStoreError};

/// Stores bytes in an object store bucket. The bucket is recorded on every
/// row so files stay readable after the configured bucket changes.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    repo: Arc<dyn FileRepository>,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, repo: Arc<dyn FileRepository>) -> Self {
        Self { store, repo }
    }

    fn bucket_of<'a>(&'a self, file: &'a FileRecord) -> &'a str {
        file.bucket.as_deref().unwrap_or_else(|| self.store.bucket())
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }

    async fn upload(&self, upload: NewUpload) -> Result<FileRecord, BackendError> {
        let prepared = prepare(&upload, Utc::now())?;
        let bucket = self.store.bucket().to_string();
        let size = upload.content.len() as u64;

        let mut stored = None;
        for placement in prepared.placements() {
            let key = placement.key();
            match self
                .store
                .put(&bucket, &key, upload.content.clone(), &prepared.content_type)
                .await
            {
                Ok(()) => {
                    stored = Some((placement, key));
                    break;
                }
                Err(ObjectStoreError::AlreadyExists(_)) => {
                    tracing::debug!(%bucket, %key, "Key taken, trying the next second");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let Some((placement, key)) = stored else {
            return Err(BackendError::PlacementExhausted(upload.filename));
        };

        let new_file = NewFile {
            user_id: upload.owner_id,
            storage: BackendKind::S3,
            path: placement.path,
            filename: placement.filename,
            bucket: Some(bucket.clone()),
            content_type: prepared.content_type,
            size,
            category: upload.category,
            visibility: upload.visibility,
        };

        match self.repo.create(new_file) {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::error!(%bucket, %key, error = %e, "Failed to persist file record");
                if let Err(cleanup) = self.store.delete(&bucket, &key).await {
                    report_orphan(&*self.repo, BackendKind::S3, Some(bucket), key, &cleanup);
                }
                Err(BackendError::Persistence(e))
            }
        }
    }

    async fn delete(&self, file: &FileRecord) -> Result<(), BackendError> {
        self.store.delete(self.bucket_of(file), &file.key()).await?;
        self.repo.delete(file)?;
        Ok(())
    }

    async fn download(&self, file: &FileRecord) -> Result<Bytes, BackendError> {
        Ok(self.store.get(self.bucket_of(file), &file.key()).await?)
    }
}

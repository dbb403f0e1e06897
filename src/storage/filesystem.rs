use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::{prepare, report_orphan, BackendError, NewUpload, StorageBackend};
use crate::metadata::{BackendKind, FileRecord, FileRepository, NewFile};

/// Stores bytes under a root directory on the local disk.
pub struct FilesystemBackend {
    root: PathBuf,
    repo: Arc<dyn FileRepository>,
}

impl FilesystemBackend {
    pub fn new<P: AsRef<Path>>(root: P, repo: Arc<dyn FileRepository>) -> Result<Self, std::io::Error> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, repo })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a record's bytes.
    pub fn object_path(&self, file: &FileRecord) -> PathBuf {
        self.root.join(&file.path).join(&file.filename)
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn upload(&self, upload: NewUpload) -> Result<FileRecord, BackendError> {
        let prepared = prepare(&upload, Utc::now())?;

        let mut stored = None;
        for placement in prepared.placements() {
            let dir = self.root.join(&placement.path);
            tokio::fs::create_dir_all(&dir).await?;
            let target = dir.join(&placement.filename);

            match write_new(&target, &upload.content).await {
                Ok(()) => {
                    stored = Some((placement, target));
                    break;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!(key = %placement.key(), "Key taken, trying the next second");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let Some((placement, target)) = stored else {
            return Err(BackendError::PlacementExhausted(upload.filename));
        };

        let new_file = NewFile {
            user_id: upload.owner_id,
            storage: BackendKind::Local,
            path: placement.path,
            filename: placement.filename,
            bucket: None,
            content_type: prepared.content_type,
            size: upload.content.len() as u64,
            category: upload.category,
            visibility: upload.visibility,
        };

        match self.repo.create(new_file.clone()) {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::error!(key = %new_file.key(), error = %e, "Failed to persist file record");
                if let Err(cleanup) = tokio::fs::remove_file(&target).await {
                    report_orphan(&*self.repo, BackendKind::Local, None, new_file.key(), &cleanup);
                }
                Err(BackendError::Persistence(e))
            }
        }
    }

    async fn delete(&self, file: &FileRecord) -> Result<(), BackendError> {
        match tokio::fs::remove_file(self.object_path(file)).await {
            Ok(()) => {}
            // Already gone; only the record is left to clean up
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(file_id = file.id, key = %file.key(), "File bytes already missing");
            }
            Err(e) => return Err(e.into()),
        }

        self.repo.delete(file)?;
        Ok(())
    }

    async fn download(&self, file: &FileRecord) -> Result<Bytes, BackendError> {
        match tokio::fs::read(self.object_path(file)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BackendError::NotFound(file.key())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Create `path` and write `content` to it, failing if it already exists.
/// A partially written file is removed again.
async fn write_new(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let written = async {
        file.write_all(content).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        if let Err(cleanup) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove partial file");
        }
        return Err(e);
    }
    Ok(())
}

mod s3;

pub use s3::S3Store;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Object already exists: {0}")]
    AlreadyExists(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Abstraction over remote bucket storage.
///
/// Every call names its bucket explicitly: records remember the bucket they
/// were written to, which may differ from the currently configured one.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket new objects are written to.
    fn bucket(&self) -> &str;
    /// Create an object. Never overwrites: an existing key fails with
    /// [`ObjectStoreError::AlreadyExists`].
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, ObjectStoreError>;
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError>;
}

use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption};
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::{ObjectStore, ObjectStoreError};
use crate::config::S3Config;

/// S3-compatible object store. Objects are written private and encrypted at
/// rest with S3-managed keys.
pub struct S3Store {
    bucket: String,
    client: Client,
}

impl S3Store {
    pub async fn new(cfg: &S3Config) -> Result<Self, anyhow::Error> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &cfg.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);

        if let (Some(access), Some(secret)) = (&cfg.access_key, &cfg.secret_key) {
            let creds = Credentials::new(
                access.clone(),
                secret.clone(),
                None,
                None,
                "files-service-static",
            );
            builder = builder.credentials_provider(creds);
        }

        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }

        if cfg.use_path_style {
            builder = builder.force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        client
            .head_bucket()
            .bucket(&cfg.bucket)
            .send()
            .await
            .with_context(|| format!("S3 bucket '{}' is not reachable", cfg.bucket))?;

        Ok(Self {
            bucket: cfg.bucket.clone(),
            client,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
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
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .if_none_match("*")
            .body(ByteStream::from(data))
            .content_type(content_type)
            .acl(ObjectCannedAcl::Private)
            .server_side_encryption(ServerSideEncryption::Aes256)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            // 412 when the key exists, 409 when a concurrent conditional write won
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.raw().status().as_u16(), 409 | 412) =>
            {
                Err(ObjectStoreError::AlreadyExists(key.to_string()))
            }
            Err(e) => Err(ObjectStoreError::Backend(format!("S3 upload failed: {e}"))),
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, ObjectStoreError> {
        let resp = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(resp) => resp,
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_no_such_key() => {
                return Err(ObjectStoreError::NotFound(key.to_string()));
            }
            Err(e) => {
                return Err(ObjectStoreError::Backend(format!(
                    "S3 download failed: {e}"
                )))
            }
        };

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        Ok(data.into_bytes())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        // S3 treats deleting a missing key as success
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("S3 delete failed: {e}")))?;

        Ok(())
    }
}

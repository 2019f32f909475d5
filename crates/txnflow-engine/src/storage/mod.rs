//! Object storage
//!
//! [`ObjectStore`] is the storage surface both pipelines depend on. The process
//! builds one [`Storage`] (S3) at start-up, hands it to each pipeline and closes
//! it at shutdown; tests use [`memory::MemoryStore`].

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument};

pub mod config;
pub mod memory;

pub use config::StorageConfig;

/// Streaming body of a downloaded object
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

/// Bucket-addressed object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<UploadResult>;

    async fn download(&self, bucket: &str, key: &str) -> Result<ObjectReader>;

    /// Every key in `bucket`.
    async fn list(&self, bucket: &str) -> Result<Vec<String>>;

    /// Move `key` from one bucket to another under the same key.
    async fn move_object(&self, key: &str, from_bucket: &str, to_bucket: &str) -> Result<()>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Release the client. Every later call fails.
    async fn close(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    closed: Arc<AtomicBool>,
}

impl Storage {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            "Initializing storage"
        );

        let mut s3_config_builder = match config.static_credentials() {
            Some((access_key, secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "txnflow-storage");
                aws_sdk_s3::Config::builder()
                    .behavior_version_latest()
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
            },
            None => {
                let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        s3_config_builder = s3_config_builder.force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "Storage client initialized");

        Ok(Self {
            client,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!("Storage client is closed");
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for Storage {
    #[instrument(skip(self, data))]
    async fn upload(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<UploadResult> {
        self.ensure_open()?;

        let checksum = calculate_sha256(&data);
        let size = data.len() as i64;

        debug!("Uploading {} bytes to s3://{}/{}", size, bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("text/csv")
            .body(ByteStream::from(data))
            .send()
            .await
            .context("Failed to upload to S3")?;

        info!("Successfully uploaded to s3://{}/{}", bucket, key);

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    #[instrument(skip(self))]
    async fn download(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        self.ensure_open()?;

        debug!("Getting stream from s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to get stream from S3: {}", key))?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    #[instrument(skip(self))]
    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        self.ensure_open()?;

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .context(format!("Failed to list S3 bucket: {}", bucket))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        debug!("Listed {} objects in s3://{}", keys.len(), bucket);

        Ok(keys)
    }

    #[instrument(skip(self))]
    async fn move_object(&self, key: &str, from_bucket: &str, to_bucket: &str) -> Result<()> {
        self.ensure_open()?;

        let copy_source = format!("{}/{}", from_bucket, key);

        self.client
            .copy_object()
            .bucket(to_bucket)
            .copy_source(&copy_source)
            .key(key)
            .send()
            .await
            .context("Failed to copy S3 object")?;

        self.client
            .delete_object()
            .bucket(from_bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to delete moved object: {}", key))?;

        info!(
            "Successfully moved s3://{}/{} to s3://{}/{}",
            from_bucket, key, to_bucket, key
        );

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.ensure_open()?;

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to delete from S3: {}", key))?;

        info!("Successfully deleted s3://{}/{}", bucket, key);

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(anyhow!("Storage client already closed"));
        }
        info!("Storage client closed");
        Ok(())
    }
}

pub(crate) fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_storage() -> Storage {
        Storage {
            client: Client::from_conf(
                aws_sdk_s3::Config::builder()
                    .behavior_version_latest()
                    .region(Region::new("us-east-1"))
                    .build(),
            ),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_calculate_sha256() {
        let data = b"Hello, World!";
        let checksum = calculate_sha256(data);
        assert_eq!(
            checksum,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[tokio::test]
    async fn test_closed_storage_rejects_operations() {
        let storage = offline_storage();
        storage.close().await.unwrap();

        let err = storage.list("inbound").await.unwrap_err();
        assert!(err.to_string().contains("closed"));
        assert!(storage.upload("out", "a.csv", b"x".to_vec()).await.is_err());
        assert!(storage.close().await.is_err());
    }

    #[tokio::test]
    async fn test_clones_share_lifecycle() {
        let storage = offline_storage();
        let handle = storage.clone();
        storage.close().await.unwrap();
        assert!(handle.delete("inbound", "a.txt").await.is_err());
    }
}

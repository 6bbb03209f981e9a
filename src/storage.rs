//! Object storage for synthesized audio. Files land in an S3 compatible
//! bucket and are served back through a CDN in front of it.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::AppError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), AppError>;
}

pub struct S3Store {
    client: Client,
    bucket: String,
    public_read: bool,
}

impl S3Store {
    pub async fn new(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(s3_config.build()),
            bucket: config.bucket.clone(),
            public_read: config.public_read,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body));

        if self.public_read {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        request.send().await.map_err(|e| {
            AppError::StorageError(format!(
                "put s3://{}/{}: {}",
                self.bucket,
                key,
                aws_sdk_s3::error::DisplayErrorContext(e)
            ))
        })?;

        Ok(())
    }
}

pub struct AudioUploader {
    store: Arc<dyn ObjectStore>,
    cdn_base_url: String,
    prefix: String,
}

impl AudioUploader {
    pub fn new(store: Arc<dyn ObjectStore>, cdn_base_url: &str, prefix: &str) -> Self {
        Self {
            store,
            cdn_base_url: cdn_base_url.trim_end_matches('/').to_string(),
            prefix: prefix.trim_start_matches('/').to_string(),
        }
    }

    pub async fn from_config(config: &StorageConfig) -> Self {
        let store = S3Store::new(config).await;
        Self::new(Arc::new(store), &config.cdn_base_url, &config.prefix)
    }

    /// Stores the WAV under a fresh key and returns its public URL.
    pub async fn upload(&self, wav: Vec<u8>) -> Result<String, AppError> {
        let key = format!("{}{}.wav", self.prefix, Uuid::new_v4());
        let size = wav.len();

        self.store.put(&key, wav, "audio/wav").await?;
        tracing::info!("Uploaded {} ({} bytes)", key, size);

        Ok(self.url_for(&key))
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.cdn_base_url, key)
    }
}

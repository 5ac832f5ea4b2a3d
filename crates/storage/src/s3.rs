//! S3-compatible object store (Cloudflare R2 by default).

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::error::StorageError;
use crate::{ObjectStore, ObjectStoreFactory};

/// R2 ignores the region but the SDK requires one.
const R2_REGION: &str = "auto";

/// Credentials and endpoint for the object store.
#[derive(Clone)]
pub struct StorageConfig {
    pub account_id: String,
    pub access_key: String,
    pub secret_access_key: String,
    /// Full endpoint URL.
    pub endpoint: String,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("account_id", &self.account_id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl StorageConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var             | Default                                      |
    /// |---------------------|----------------------------------------------|
    /// | `ACCOUNT_ID`        | required                                     |
    /// | `ACCESS_KEY`        | required                                     |
    /// | `SECRET_ACCESS_KEY` | required                                     |
    /// | `S3_ENDPOINT`       | `https://{ACCOUNT_ID}.r2.cloudflarestorage.com` |
    pub fn from_env() -> Result<Self, StorageError> {
        let account_id = required_var("ACCOUNT_ID")?;
        let access_key = required_var("ACCESS_KEY")?;
        let secret_access_key = required_var("SECRET_ACCESS_KEY")?;
        let endpoint = std::env::var("S3_ENDPOINT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| r2_endpoint(&account_id));

        Ok(Self {
            account_id,
            access_key,
            secret_access_key,
            endpoint,
        })
    }
}

fn required_var(name: &str) -> Result<String, StorageError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(StorageError::Config(format!("{name} must be set"))),
    }
}

/// Account-scoped R2 endpoint.
pub fn r2_endpoint(account_id: &str) -> String {
    format!("https://{account_id}.r2.cloudflarestorage.com")
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Shares one SDK client across per-bucket stores.
#[derive(Clone)]
pub struct S3ObjectStoreFactory {
    client: Client,
}

impl S3ObjectStoreFactory {
    /// Build the SDK client with static credentials and path-style
    /// addressing.
    pub async fn connect(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "imagepp-static",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(R2_REGION))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        tracing::info!(endpoint = %config.endpoint, "Object store client configured");

        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

impl ObjectStoreFactory for S3ObjectStoreFactory {
    fn for_bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::Config("bucket name must not be empty".into()));
        }
        Ok(Arc::new(S3ObjectStore {
            client: self.client.clone(),
            bucket: bucket.to_string(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// One bucket on an S3-compatible endpoint.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Download {
                key: key.to_string(),
                reason: DisplayErrorContext(e).to_string(),
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Download {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let bytes = body.into_bytes().to_vec();
        tracing::debug!(bucket = %self.bucket, key, size = bytes.len(), "Downloaded object");
        Ok(bytes)
    }

    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                reason: DisplayErrorContext(e).to_string(),
            })?;

        tracing::debug!(bucket = %self.bucket, key, size, "Uploaded object");
        Ok(())
    }
}

//! Object Store client: raw bytes in and out of a bucket by key.
//!
//! [`s3::S3ObjectStoreFactory`] talks to any S3-compatible endpoint
//! (Cloudflare R2 by default); [`memory::MemoryObjectStore`] keeps objects
//! in process and can inject transfer failures for tests.

pub mod error;
pub mod memory;
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;

pub use error::StorageError;
pub use memory::MemoryObjectStore;
pub use s3::{S3ObjectStoreFactory, StorageConfig};

/// Download and upload raw bytes within one bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;
}

/// Builds an [`ObjectStore`] scoped to a bucket named by a task envelope.
pub trait ObjectStoreFactory: Send + Sync {
    fn for_bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError>;
}

//! In-process object store with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::{ObjectStore, ObjectStoreFactory};

#[derive(Default)]
struct Inner {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    failing_downloads: AtomicU32,
    failing_uploads: AtomicU32,
    download_attempts: AtomicU32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Memory-backed object store spanning any number of buckets.
///
/// Cloning shares the same objects and counters.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    inner: Arc<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object.
    pub async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        let object = StoredObject {
            bytes,
            content_type: "application/octet-stream".to_string(),
        };
        self.inner
            .objects
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()), object);
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.inner
            .objects
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Make the next `count` downloads fail.
    pub fn fail_next_downloads(&self, count: u32) {
        self.inner.failing_downloads.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` uploads fail.
    pub fn fail_next_uploads(&self, count: u32) {
        self.inner.failing_uploads.store(count, Ordering::SeqCst);
    }

    /// Downloads attempted so far, failed ones included.
    pub fn download_attempts(&self) -> u32 {
        self.inner.download_attempts.load(Ordering::SeqCst)
    }

    pub fn bucket(&self, bucket: &str) -> MemoryBucket {
        MemoryBucket {
            inner: Arc::clone(&self.inner),
            bucket: bucket.to_string(),
        }
    }
}

/// Consume one injected failure, if any remain.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl ObjectStoreFactory for MemoryObjectStore {
    fn for_bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::Config("bucket name must not be empty".into()));
        }
        Ok(Arc::new(self.bucket(bucket)))
    }
}

/// View of one bucket inside a [`MemoryObjectStore`].
pub struct MemoryBucket {
    inner: Arc<Inner>,
    bucket: String,
}

#[async_trait]
impl ObjectStore for MemoryBucket {
    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.download_attempts.fetch_add(1, Ordering::SeqCst);

        if take_failure(&self.inner.failing_downloads) {
            return Err(StorageError::Download {
                key: key.to_string(),
                reason: "injected failure".into(),
            });
        }

        self.inner
            .objects
            .lock()
            .await
            .get(&(self.bucket.clone(), key.to_string()))
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StorageError::Download {
                key: key.to_string(),
                reason: format!("no such key in bucket {}", self.bucket),
            })
    }

    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        if take_failure(&self.inner.failing_uploads) {
            return Err(StorageError::Upload {
                key: key.to_string(),
                reason: "injected failure".into(),
            });
        }

        let object = StoredObject {
            bytes,
            content_type: content_type.to_string(),
        };
        self.inner
            .objects
            .lock()
            .await
            .insert((self.bucket.clone(), key.to_string()), object);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

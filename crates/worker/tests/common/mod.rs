//! Shared harness for worker integration tests.
//!
//! Wires the image processor and the health-check handler to the in-memory
//! job store, object store and broker.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};
use imagepp_core::envelope::{
    QueueClass, TaskEnvelope, TaskOptions, TASK_TYPE_HEALTH_CHECK, TASK_TYPE_IMAGE_PROCESS,
};
use imagepp_core::operation::{Operation, OutputFormat};
use imagepp_core::status::TaskStatus;
use imagepp_core::types::DbId;
use imagepp_db::models::image::{CreateImage, Image};
use imagepp_db::{JobStore, MemoryJobStore};
use imagepp_pipeline::CompressConfig;
use imagepp_queue::{claim_weighted, enqueue_json, MemoryTaskQueue, TaskId, TaskQueue};
use imagepp_storage::{MemoryObjectStore, ObjectStoreFactory};
use imagepp_worker::dispatcher::execute_task;
use imagepp_worker::health::HealthCheckHandler;
use imagepp_worker::{HandlerRegistry, ImageProcessor};

pub const BUCKET: &str = "b";
pub const IMAGE_KEY: &str = "k.jpg";

/// Encoded JPEG test image.
pub fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 90])
    }));
    CompressConfig {
        format: OutputFormat::Jpeg,
        ..CompressConfig::default()
    }
    .encode(&img)
    .unwrap()
}

pub fn operations(value: serde_json::Value) -> Vec<Operation> {
    serde_json::from_value(value).unwrap()
}

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub objects: MemoryObjectStore,
    pub queue: Arc<MemoryTaskQueue>,
    pub registry: HandlerRegistry,
}

impl Harness {
    /// Harness whose processor talks to its own store and object store.
    pub async fn new() -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let objects = MemoryObjectStore::new();
        let factory: Arc<dyn ObjectStoreFactory> = Arc::new(objects.clone());
        Self::wired(store.clone(), store, objects, factory).await
    }

    /// Harness whose processor uses `job_store` and `factory` while the
    /// harness keeps direct handles to the memory backends for assertions.
    pub async fn wired(
        store: Arc<MemoryJobStore>,
        job_store: Arc<dyn JobStore>,
        objects: MemoryObjectStore,
        factory: Arc<dyn ObjectStoreFactory>,
    ) -> Self {
        objects.put(BUCKET, IMAGE_KEY, jpeg_fixture(200, 200)).await;

        let registry = HandlerRegistry::new()
            .register(
                TASK_TYPE_IMAGE_PROCESS,
                Arc::new(ImageProcessor::new(job_store, factory)),
            )
            .register(TASK_TYPE_HEALTH_CHECK, Arc::new(HealthCheckHandler));

        Self {
            store,
            objects,
            queue: Arc::new(MemoryTaskQueue::new()),
            registry,
        }
    }

    /// Create a pending job the way the submission service does and enqueue
    /// its envelope with the image task options.
    pub async fn submit(&self, operations: Vec<Operation>) -> (DbId, TaskId) {
        self.submit_with(operations, TaskOptions::image_processing()).await
    }

    pub async fn submit_with(
        &self,
        operations: Vec<Operation>,
        options: TaskOptions,
    ) -> (DbId, TaskId) {
        let user = match self.store.get_user_by_email("a@x.com").await.unwrap() {
            Some(user) => user,
            None => self.store.create_user("a@x.com").await.unwrap(),
        };
        let image = self
            .store
            .create_image(&CreateImage {
                user_id: user.id,
                bucket_name: BUCKET.into(),
                image_key: IMAGE_KEY.into(),
                operations: operations.clone(),
            })
            .await
            .unwrap();

        let envelope = TaskEnvelope {
            image_id: image.id,
            user_id: user.id,
            bucket_name: BUCKET.into(),
            image_key: IMAGE_KEY.into(),
            operations,
        };
        let task_id = self.enqueue(&envelope, options).await;
        (image.id, task_id)
    }

    pub async fn enqueue(&self, envelope: &TaskEnvelope, options: TaskOptions) -> TaskId {
        enqueue_json(self.queue.as_ref(), TASK_TYPE_IMAGE_PROCESS, envelope, options)
            .await
            .unwrap()
    }

    pub async fn enqueue_raw(&self, task_type: &str, payload: serde_json::Value) -> TaskId {
        self.queue
            .enqueue(task_type, payload, TaskOptions::image_processing())
            .await
            .unwrap()
    }

    /// Claim and execute tasks until none are pending, retrying or active,
    /// stepping the paused clock past backoff delays. Returns the number of
    /// executions.
    pub async fn drain(&self) -> u32 {
        let mut executions = 0;
        loop {
            match claim_weighted(self.queue.as_ref()).await.unwrap() {
                Some(task) => {
                    executions += 1;
                    let _ = execute_task(self.queue.as_ref(), &self.registry, task).await;
                }
                None => {
                    let waiting = self.queue.count(TaskStatus::Pending).await
                        + self.queue.count(TaskStatus::Retry).await
                        + self.queue.count(TaskStatus::Active).await;
                    if waiting == 0 {
                        return executions;
                    }
                    tokio::time::advance(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Claim the next due critical task and execute it once.
    pub async fn run_once(&self) -> Result<(), imagepp_worker::ProcessError> {
        let task = self
            .queue
            .claim(QueueClass::Critical)
            .await
            .unwrap()
            .expect("a due task");
        execute_task(self.queue.as_ref(), &self.registry, task).await
    }

    pub async fn image(&self, id: DbId) -> Image {
        self.store.find_image(id).await.unwrap().unwrap()
    }
}

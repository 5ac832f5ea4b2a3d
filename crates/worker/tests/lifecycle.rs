//! Job lifecycle through the dispatcher, processor and memory backends.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use imagepp_core::envelope::{TaskEnvelope, TaskOptions, TASK_TYPE_HEALTH_CHECK, TASK_TYPE_IMAGE_PROCESS};
use imagepp_core::status::{JobStatus, TaskStatus};
use imagepp_core::types::DbId;
use imagepp_db::models::image::{CreateImage, Image};
use imagepp_db::models::user::User;
use imagepp_db::{DbError, JobStore, MemoryJobStore};
use imagepp_queue::TaskQueue;
use imagepp_storage::{MemoryObjectStore, ObjectStore, ObjectStoreFactory, StorageError};
use imagepp_worker::{Dispatcher, ProcessError, WorkerConfig};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{operations, Harness, BUCKET, IMAGE_KEY};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Records the job's status at the moment each download starts, optionally
/// stalling the download.
struct ProbeFactory {
    objects: MemoryObjectStore,
    store: Arc<MemoryJobStore>,
    seen: Arc<Mutex<Vec<Option<JobStatus>>>>,
    stall: Option<Duration>,
}

struct ProbeBucket {
    inner: Arc<dyn ObjectStore>,
    store: Arc<MemoryJobStore>,
    seen: Arc<Mutex<Vec<Option<JobStatus>>>>,
    stall: Option<Duration>,
}

impl ObjectStoreFactory for ProbeFactory {
    fn for_bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        Ok(Arc::new(ProbeBucket {
            inner: self.objects.for_bucket(bucket)?,
            store: Arc::clone(&self.store),
            seen: Arc::clone(&self.seen),
            stall: self.stall,
        }))
    }
}

#[async_trait]
impl ObjectStore for ProbeBucket {
    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let status = self.store.images().await.first().and_then(Image::status);
        self.seen.lock().unwrap().push(status);
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        self.inner.download(key).await
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.inner.upload(key, bytes, content_type).await
    }
}

/// Job store whose `failed` writes always error.
struct BrokenFailedWrites(Arc<MemoryJobStore>);

#[async_trait]
impl JobStore for BrokenFailedWrites {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        self.0.get_user_by_email(email).await
    }

    async fn create_user(&self, email: &str) -> Result<User, DbError> {
        self.0.create_user(email).await
    }

    async fn create_image(&self, input: &CreateImage) -> Result<Image, DbError> {
        self.0.create_image(input).await
    }

    async fn update_image_status(&self, id: DbId, status: JobStatus) -> Result<bool, DbError> {
        self.0.update_image_status(id, status).await
    }

    async fn mark_completed(&self, id: DbId, output_key: &str) -> Result<bool, DbError> {
        self.0.mark_completed(id, output_key).await
    }

    async fn mark_failed(&self, _id: DbId, _error: &str) -> Result<bool, DbError> {
        Err(DbError::Unavailable("job store offline".into()))
    }

    async fn find_image(&self, id: DbId) -> Result<Option<Image>, DbError> {
        self.0.find_image(id).await
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.0.ping().await
    }
}

async fn probed_harness(stall: Option<Duration>) -> (Harness, Arc<Mutex<Vec<Option<JobStatus>>>>) {
    let store = Arc::new(MemoryJobStore::new());
    let objects = MemoryObjectStore::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let factory = Arc::new(ProbeFactory {
        objects: objects.clone(),
        store: Arc::clone(&store),
        seen: Arc::clone(&seen),
        stall,
    });
    let harness = Harness::wired(store.clone(), store, objects, factory).await;
    (harness, seen)
}

// ---------------------------------------------------------------------------
// Successful jobs
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn watermark_job_completes_and_uploads_jpeg() {
    let harness = Harness::new().await;
    let (image_id, task_id) = harness
        .submit(operations(json!([
            {"type": "watermark", "params": {"text": "Test", "position": "center", "opacity": 0.5}}
        ])))
        .await;

    assert_eq!(harness.drain().await, 1);

    let image = harness.image(image_id).await;
    let expected_key = format!("processed/{image_id}.jpg");
    assert_eq!(image.status(), Some(JobStatus::Completed));
    assert_eq!(image.output_key.as_deref(), Some(expected_key.as_str()));
    assert_eq!(image.error_message, None);

    let stored = harness.objects.get(BUCKET, &expected_key).await.unwrap();
    assert_eq!(stored.content_type, "image/jpeg");
    let decoded = image::load_from_memory(&stored.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 200));

    let task = harness.queue.task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.deliveries, 1);
}

#[tokio::test(start_paused = true)]
async fn compress_job_writes_resized_png() {
    let harness = Harness::new().await;
    let (image_id, _) = harness
        .submit(operations(json!([
            {"type": "compress", "params": {"format": "png", "max_width": 100, "max_height": 100}}
        ])))
        .await;

    harness.drain().await;

    let key = format!("processed/{image_id}.png");
    assert_eq!(harness.image(image_id).await.output_key.as_deref(), Some(key.as_str()));
    let stored = harness.objects.get(BUCKET, &key).await.unwrap();
    assert_eq!(stored.content_type, "image/png");
    let decoded = image::load_from_memory(&stored.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 100));
}

#[tokio::test(start_paused = true)]
async fn unknown_operations_and_values_still_complete() {
    let harness = Harness::new().await;
    let (image_id, _) = harness
        .submit(operations(json!([
            {"type": "blur", "params": {"radius": 3}},
            {"type": "watermark", "params": {"text": "x", "position": "middle", "color": "not-a-color"}},
            {"type": "compress", "params": {"format": "gif", "quality": 500}}
        ])))
        .await;

    harness.drain().await;

    let image = harness.image(image_id).await;
    assert_eq!(image.status(), Some(JobStatus::Completed));
    assert_eq!(image.output_key, Some(format!("processed/{image_id}.jpg")));
}

#[tokio::test(start_paused = true)]
async fn huge_font_size_and_fractional_numbers_complete_first_try() {
    let harness = Harness::new().await;
    let (image_id, _) = harness
        .submit(operations(json!([
            {"type": "watermark", "params": {"text": "Test", "font_size": 1.0e10, "opacity": 1.0}},
            {"type": "compress", "params": {"quality": 80.0, "max_width": 32.0}}
        ])))
        .await;

    let executions = harness.drain().await;

    assert_eq!(executions, 1);
    let image = harness.image(image_id).await;
    assert_eq!(image.status(), Some(JobStatus::Completed));
    assert_eq!(image.output_key, Some(format!("processed/{image_id}.jpg")));
}

#[tokio::test(start_paused = true)]
async fn processing_is_recorded_before_download() {
    let (harness, seen) = probed_harness(None).await;
    let (image_id, _) = harness.submit(Vec::new()).await;

    harness.drain().await;

    assert_eq!(*seen.lock().unwrap(), vec![Some(JobStatus::Processing)]);
    assert_eq!(harness.image(image_id).await.status(), Some(JobStatus::Completed));
}

// ---------------------------------------------------------------------------
// Failures and retries
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_download_failures_are_retried_until_success() {
    let harness = Harness::new().await;
    harness.objects.fail_next_downloads(2);
    let (image_id, task_id) = harness.submit(Vec::new()).await;

    assert_eq!(harness.drain().await, 3);

    assert_eq!(harness.objects.download_attempts(), 3);
    let image = harness.image(image_id).await;
    assert_eq!(image.status(), Some(JobStatus::Completed));
    assert_eq!(image.output_key, Some(format!("processed/{image_id}.jpg")));

    let task = harness.queue.task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.deliveries, 3);
    assert_eq!(task.retried, 2);
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_marks_job_failed_and_dead_letters_task() {
    let harness = Harness::new().await;
    harness.objects.fail_next_downloads(100);
    let (image_id, task_id) = harness.submit(Vec::new()).await;

    assert_eq!(harness.drain().await, 4);

    let image = harness.image(image_id).await;
    assert_eq!(image.status(), Some(JobStatus::Failed));
    assert_eq!(image.output_key, None);
    let message = image.error_message.unwrap();
    assert!(message.contains("failed to download k.jpg"), "{message}");

    let task = harness.queue.task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Dead);
    assert_eq!(task.deliveries, 4);
}

#[tokio::test(start_paused = true)]
async fn missing_source_object_fails_the_attempt() {
    let store = Arc::new(MemoryJobStore::new());
    let empty = MemoryObjectStore::new();
    let harness = Harness::wired(
        store.clone(),
        store,
        MemoryObjectStore::new(),
        Arc::new(empty.clone()),
    )
    .await;
    let (image_id, _) = harness.submit(Vec::new()).await;

    let result = harness.run_once().await;

    assert_matches!(result, Err(ProcessError::Transfer(StorageError::Download { .. })));
    assert_eq!(empty.download_attempts(), 1);
    let message = harness.image(image_id).await.error_message.unwrap();
    assert!(message.contains("no such key"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn failed_status_write_does_not_mask_the_original_error() {
    let store = Arc::new(MemoryJobStore::new());
    let objects = MemoryObjectStore::new();
    objects.fail_next_downloads(1);
    let factory = Arc::new(objects.clone());
    let harness = Harness::wired(
        store.clone(),
        Arc::new(BrokenFailedWrites(store)),
        objects,
        factory,
    )
    .await;
    let (image_id, task_id) = harness.submit(Vec::new()).await;

    let result = harness.run_once().await;

    assert_matches!(result, Err(ProcessError::Transfer(StorageError::Download { .. })));
    assert_eq!(harness.image(image_id).await.status(), Some(JobStatus::Processing));
    assert_eq!(harness.queue.task(task_id).await.unwrap().status, TaskStatus::Retry);
}

#[tokio::test(start_paused = true)]
async fn timed_out_attempt_records_failure() {
    let (harness, _) = probed_harness(Some(Duration::from_secs(120))).await;
    let options = TaskOptions {
        timeout: Duration::from_secs(1),
        ..TaskOptions::image_processing()
    };
    let (image_id, task_id) = harness.submit_with(Vec::new(), options).await;

    let result = harness.run_once().await;

    assert_matches!(result, Err(ProcessError::Timeout(d)) if d == Duration::from_secs(1));
    let image = harness.image(image_id).await;
    assert_eq!(image.status(), Some(JobStatus::Failed));
    assert_eq!(image.error_message.as_deref(), Some("task exceeded its 1s timeout"));
    assert_eq!(harness.queue.task(task_id).await.unwrap().status, TaskStatus::Retry);
}

// ---------------------------------------------------------------------------
// Duplicates and bad payloads
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn duplicate_delivery_after_completion_is_skipped() {
    let harness = Harness::new().await;
    let (image_id, task_id) = harness.submit(Vec::new()).await;
    harness.drain().await;
    let completed = harness.image(image_id).await;

    let payload = harness.queue.task(task_id).await.unwrap().payload;
    let duplicate = harness.enqueue_raw(TASK_TYPE_IMAGE_PROCESS, payload).await;
    harness.run_once().await.unwrap();

    assert_eq!(harness.objects.download_attempts(), 1);
    let image = harness.image(image_id).await;
    assert_eq!(image.status(), Some(JobStatus::Completed));
    assert_eq!(image.output_key, completed.output_key);
    assert_eq!(harness.queue.task(duplicate).await.unwrap().status, TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn payload_missing_fields_is_rejected() {
    let harness = Harness::new().await;
    let task_id = harness
        .enqueue_raw(TASK_TYPE_IMAGE_PROCESS, json!({"user_id": 1, "bucket_name": "b"}))
        .await;

    let result = harness.run_once().await;

    assert_matches!(result, Err(ProcessError::InvalidPayload(_)));
    assert_eq!(harness.objects.download_attempts(), 0);
    assert_eq!(harness.queue.task(task_id).await.unwrap().status, TaskStatus::Retry);
}

#[tokio::test(start_paused = true)]
async fn payload_with_wrong_types_fails_decoding() {
    let harness = Harness::new().await;
    harness
        .enqueue_raw(TASK_TYPE_IMAGE_PROCESS, json!({"image_id": "seven"}))
        .await;

    assert_matches!(harness.run_once().await, Err(ProcessError::Payload(_)));
}

#[tokio::test(start_paused = true)]
async fn envelope_for_unknown_job_is_rejected() {
    let harness = Harness::new().await;
    harness
        .enqueue(
            &TaskEnvelope {
                image_id: 999,
                user_id: 1,
                bucket_name: BUCKET.into(),
                image_key: IMAGE_KEY.into(),
                operations: Vec::new(),
            },
            TaskOptions::image_processing(),
        )
        .await;

    assert_matches!(harness.run_once().await, Err(ProcessError::InvalidPayload(m)) if m.contains("does not exist"));
    assert_eq!(harness.objects.download_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn unregistered_task_type_is_failed() {
    let harness = Harness::new().await;
    let task_id = harness.enqueue_raw("email:send", json!({})).await;

    assert_matches!(
        harness.run_once().await,
        Err(ProcessError::UnknownTaskType(t)) if t == "email:send"
    );
    assert_eq!(harness.queue.task(task_id).await.unwrap().status, TaskStatus::Retry);
}

#[tokio::test(start_paused = true)]
async fn health_check_probe_is_acknowledged() {
    let harness = Harness::new().await;
    let task_id = harness
        .queue
        .enqueue(TASK_TYPE_HEALTH_CHECK, json!({}), TaskOptions::health_check())
        .await
        .unwrap();

    assert_eq!(harness.drain().await, 1);
    assert_eq!(harness.queue.task(task_id).await.unwrap().status, TaskStatus::Completed);
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatcher_processes_jobs_until_cancelled() {
    let harness = Harness::new().await;
    let (first, _) = harness.submit(Vec::new()).await;
    let (second, _) = harness
        .submit(operations(json!([{"type": "compress", "params": {"format": "webp"}}])))
        .await;

    let config = WorkerConfig {
        concurrency: 2,
        poll_interval: Duration::from_millis(10),
        ..WorkerConfig::default()
    };
    let dispatcher = Dispatcher::new(harness.queue.clone(), harness.registry.clone(), &config);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    for _ in 0..500 {
        if harness.queue.count(TaskStatus::Completed).await == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(harness.image(first).await.status(), Some(JobStatus::Completed));
    let second = harness.image(second).await;
    assert_eq!(second.status(), Some(JobStatus::Completed));
    assert_eq!(second.output_key, Some(format!("processed/{}.webp", second.id)));
}

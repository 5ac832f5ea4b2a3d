//! The `process:image` state machine.
//!
//! ```text
//! Received -> Validated -> Executing -> { Succeeded | Failed }
//! ```
//!
//! 1. **Received**: decode the [`TaskEnvelope`]. A payload that does not
//!    decode fails this delivery.
//! 2. **Validated**: require a job ID, bucket and key.
//! 3. **Executing**: write `processing` *before* any pipeline work, then
//!    download, transform, upload to `processed/{id}.{ext}` and write
//!    `completed` with the output key.
//! 4. **Failed**: a transfer, pipeline or timeout error writes `failed`
//!    with the error message (best-effort) and returns the original error
//!    so the broker can retry.
//!
//! Status writes are guarded. A delivery whose `processing` write is
//! refused because the job already completed is a stale duplicate and is
//! acknowledged without doing any work.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use imagepp_core::envelope::TaskEnvelope;
use imagepp_core::status::JobStatus;
use imagepp_core::types::DbId;
use imagepp_db::JobStore;
use imagepp_queue::ClaimedTask;
use imagepp_storage::ObjectStoreFactory;

use crate::error::ProcessError;
use crate::handler::TaskHandler;

/// How a delivery ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The transformed object was uploaded under `output_key`.
    Completed { output_key: String },
    /// The job had already completed; nothing was done.
    SkippedDuplicate,
}

/// Drives one image job through its lifecycle.
pub struct ImageProcessor {
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStoreFactory>,
}

impl ImageProcessor {
    pub fn new(store: Arc<dyn JobStore>, objects: Arc<dyn ObjectStoreFactory>) -> Self {
        Self { store, objects }
    }

    /// Decode and validate a task payload.
    pub fn decode_envelope(payload: &serde_json::Value) -> Result<TaskEnvelope, ProcessError> {
        let envelope: TaskEnvelope = serde_json::from_value(payload.clone())?;
        envelope
            .validate()
            .map_err(|e| ProcessError::InvalidPayload(e.to_string()))?;
        Ok(envelope)
    }

    /// Run one delivery of `envelope`, bounding the transfer and transform
    /// work by `timeout`.
    pub async fn process(
        &self,
        envelope: &TaskEnvelope,
        timeout: Duration,
    ) -> Result<JobOutcome, ProcessError> {
        let image_id = envelope.image_id;

        if !self.enter_processing(image_id).await? {
            tracing::info!(image_id, "Job already completed, skipping duplicate delivery");
            return Ok(JobOutcome::SkippedDuplicate);
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, self.execute(envelope)).await {
            Ok(result) => result,
            Err(_) => Err(ProcessError::Timeout(timeout)),
        };

        match result {
            Ok(output_key) => {
                self.record_completion(image_id, &output_key).await?;
                tracing::info!(
                    image_id,
                    output_key = %output_key,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Image processed",
                );
                Ok(JobOutcome::Completed { output_key })
            }
            Err(err) => {
                self.record_failure(image_id, &err).await;
                Err(err)
            }
        }
    }

    /// Write `processing`. Returns `false` when the job already completed.
    async fn enter_processing(&self, image_id: DbId) -> Result<bool, ProcessError> {
        if self
            .store
            .update_image_status(image_id, JobStatus::Processing)
            .await?
        {
            return Ok(true);
        }

        match self.store.find_image(image_id).await? {
            Some(image) if image.status() == Some(JobStatus::Completed) => Ok(false),
            Some(image) => Err(ProcessError::InvalidPayload(format!(
                "job {image_id} cannot enter processing from status id {}",
                image.status_id
            ))),
            None => Err(ProcessError::InvalidPayload(format!(
                "job {image_id} does not exist"
            ))),
        }
    }

    /// Download, transform and upload. Returns the output key.
    async fn execute(&self, envelope: &TaskEnvelope) -> Result<String, ProcessError> {
        let objects = self.objects.for_bucket(&envelope.bucket_name)?;
        let source = objects.download(&envelope.image_key).await?;
        tracing::debug!(
            image_id = envelope.image_id,
            image_key = %envelope.image_key,
            size = source.len(),
            "Source image downloaded",
        );

        let operations = envelope.operations.clone();
        let output = tokio::task::spawn_blocking(move || imagepp_pipeline::run(&source, &operations))
            .await
            .map_err(|e| ProcessError::Aborted(e.to_string()))??;

        let output_key = output.object_key(envelope.image_id);
        let content_type = output.content_type();
        objects.upload(&output_key, output.bytes, content_type).await?;

        Ok(output_key)
    }

    async fn record_completion(&self, image_id: DbId, output_key: &str) -> Result<(), ProcessError> {
        if !self.store.mark_completed(image_id, output_key).await? {
            tracing::warn!(image_id, "Completed status write was refused by the job's current status");
        }
        Ok(())
    }

    /// Best-effort `failed` write. Its own failure is logged, never returned.
    async fn record_failure(&self, image_id: DbId, err: &ProcessError) {
        match self.store.mark_failed(image_id, &err.to_string()).await {
            Ok(true) => {
                tracing::warn!(image_id, error = %err, "Image processing failed");
            }
            Ok(false) => {
                tracing::warn!(
                    image_id,
                    error = %err,
                    "Image processing failed; failed status write was refused",
                );
            }
            Err(store_err) => {
                tracing::error!(
                    image_id,
                    error = %err,
                    store_error = %store_err,
                    "Image processing failed and the failed status could not be persisted",
                );
            }
        }
    }
}

#[async_trait]
impl TaskHandler for ImageProcessor {
    async fn handle(&self, task: &ClaimedTask) -> Result<(), ProcessError> {
        let envelope = Self::decode_envelope(&task.payload)?;
        self.process(&envelope, task.timeout).await.map(|_| ())
    }
}

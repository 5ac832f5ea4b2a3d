//! Job Submission Service.
//!
//! Validates a request, resolves the submitting user, creates the job row in
//! `pending` and only then enqueues its [`TaskEnvelope`]. A failed enqueue
//! leaves the job `pending` with no task; it is logged at `error` level and
//! not compensated.

use std::sync::Arc;

use imagepp_core::envelope::{TaskEnvelope, TaskOptions, TASK_TYPE_IMAGE_PROCESS};
use imagepp_core::error::CoreError;
use imagepp_core::request::{ProcessImageRequest, ValidatedRequest};
use imagepp_core::types::DbId;
use imagepp_db::models::image::CreateImage;
use imagepp_db::models::user::User;
use imagepp_db::{DbError, JobStore};
use imagepp_queue::{enqueue_json, QueueError, TaskId, TaskQueue};
use serde::Serialize;

/// Status reported to the submitter once a job is accepted.
pub const ACCEPTED_STATUS: &str = "processing";

/// Why a submission was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Malformed request. Never retried.
    #[error("{0}")]
    Validation(String),

    /// The Job Store could not be read or written.
    #[error("job store error: {0}")]
    Persistence(#[from] DbError),

    /// The job row exists but its task could not be enqueued.
    #[error("failed to enqueue job {image_id}: {source}")]
    Enqueue {
        image_id: DbId,
        #[source]
        source: QueueError,
    },
}

/// Body of a `202 Accepted` submission response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub image_id: DbId,
    pub user_id: DbId,
    pub bucket_name: String,
    pub image_key: String,
    pub status: &'static str,
    #[serde(skip)]
    pub task_id: TaskId,
}

pub struct SubmissionService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Accept a job. Never waits for pipeline execution.
    pub async fn submit(&self, request: ProcessImageRequest) -> Result<SubmissionReceipt, SubmitError> {
        let request = request.into_validated().map_err(|e| match e {
            CoreError::Validation(msg) => SubmitError::Validation(msg),
            other => SubmitError::Validation(other.to_string()),
        })?;

        let user = self.resolve_user(&request.email).await?;
        let image = self
            .store
            .create_image(&CreateImage {
                user_id: user.id,
                bucket_name: request.bucket_name.clone(),
                image_key: request.image_key.clone(),
                operations: request.operations.clone(),
            })
            .await?;
        tracing::info!(
            image_id = image.id,
            user_id = user.id,
            image_key = %image.image_key,
            "Job created",
        );

        let task_id = self.enqueue(image.id, user.id, request).await?;

        Ok(SubmissionReceipt {
            image_id: image.id,
            user_id: user.id,
            bucket_name: image.bucket_name,
            image_key: image.image_key,
            status: ACCEPTED_STATUS,
            task_id,
        })
    }

    /// Look the user up by email, creating them on a miss.
    ///
    /// A uniqueness conflict means a concurrent submission created the same
    /// user first; the lookup is retried once.
    async fn resolve_user(&self, email: &str) -> Result<User, SubmitError> {
        if let Some(user) = self.store.get_user_by_email(email).await? {
            return Ok(user);
        }

        match self.store.create_user(email).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, "User created");
                Ok(user)
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!("User created concurrently, retrying lookup");
                self.store
                    .get_user_by_email(email)
                    .await?
                    .ok_or(SubmitError::Persistence(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn enqueue(
        &self,
        image_id: DbId,
        user_id: DbId,
        request: ValidatedRequest,
    ) -> Result<TaskId, SubmitError> {
        let envelope = TaskEnvelope {
            image_id,
            user_id,
            bucket_name: request.bucket_name,
            image_key: request.image_key,
            operations: request.operations,
        };
        let options = TaskOptions::image_processing();

        match enqueue_json(self.queue.as_ref(), TASK_TYPE_IMAGE_PROCESS, &envelope, options).await {
            Ok(task_id) => {
                tracing::info!(image_id, task_id, queue = %options.queue, "Job enqueued");
                Ok(task_id)
            }
            Err(source) => {
                tracing::error!(
                    image_id,
                    error = %source,
                    "Job created but not enqueued; left pending without a task",
                );
                Err(SubmitError::Enqueue { image_id, source })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

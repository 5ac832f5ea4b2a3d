use std::time::Duration;

use imagepp_db::DbError;
use imagepp_pipeline::PipelineError;
use imagepp_storage::StorageError;

/// Why one task attempt failed.
///
/// Every variant is returned to the broker, which applies the same
/// retry/backoff policy regardless of cause.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to decode task payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidPayload(String),

    #[error("job store error: {0}")]
    Persistence(#[from] DbError),

    #[error(transparent)]
    Transfer(#[from] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("task exceeded its {}s timeout", .0.as_secs())]
    Timeout(Duration),

    #[error("no handler registered for task type '{0}'")]
    UnknownTaskType(String),

    #[error("pipeline worker thread failed: {0}")]
    Aborted(String),
}

//! Durable task broker.
//!
//! At-least-once delivery, three weighted queue classes, and per-task retry
//! with exponential backoff. [`postgres::PgTaskQueue`] keeps broker state in
//! the `tasks` table; [`memory::MemoryTaskQueue`] keeps it in process.

pub mod backoff;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod schedule;

use std::time::Duration;

use async_trait::async_trait;
use imagepp_core::envelope::{QueueClass, TaskOptions};
use imagepp_core::types::DbId;
use serde::Serialize;

pub use backoff::FailOutcome;
pub use error::QueueError;
pub use memory::MemoryTaskQueue;
pub use postgres::PgTaskQueue;
pub use schedule::claim_weighted;

/// Broker task identity.
pub type TaskId = DbId;

/// How long past its timeout an `active` task may go unacknowledged before
/// it is considered abandoned by a lost worker.
pub const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(30);

/// A task handed to a worker for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedTask {
    pub id: TaskId,
    pub task_type: String,
    pub queue: QueueClass,
    pub payload: serde_json::Value,
    /// Failed attempts before this one.
    pub retried: u32,
    pub max_retry: u32,
    pub timeout: Duration,
}

impl ClaimedTask {
    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.retried + 1
    }
}

/// Broker operations.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Store a task, claimable immediately on `options.queue`.
    async fn enqueue(
        &self,
        task_type: &str,
        payload: serde_json::Value,
        options: TaskOptions,
    ) -> Result<TaskId, QueueError>;

    /// Claim the oldest due task on `queue`, if any.
    async fn claim(&self, queue: QueueClass) -> Result<Option<ClaimedTask>, QueueError>;

    /// Acknowledge a successful attempt.
    async fn complete(&self, task: &ClaimedTask) -> Result<(), QueueError>;

    /// Record a failed attempt, then schedule a retry or dead-letter.
    async fn fail(&self, task: &ClaimedTask, error: &str) -> Result<FailOutcome, QueueError>;

    /// Redeliver tasks whose worker disappeared. Returns how many moved.
    async fn recover_stale(&self) -> Result<u64, QueueError>;

    /// Reachability probe used by the health endpoint.
    async fn ping(&self) -> Result<(), QueueError>;
}

/// Serialize `payload` and enqueue it.
pub async fn enqueue_json<T>(
    queue: &dyn TaskQueue,
    task_type: &str,
    payload: &T,
    options: TaskOptions,
) -> Result<TaskId, QueueError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(payload)?;
    queue.enqueue(task_type, value, options).await
}

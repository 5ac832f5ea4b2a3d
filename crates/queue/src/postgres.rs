//! Broker backed by the `tasks` table.

use std::time::Duration;

use async_trait::async_trait;
use imagepp_core::envelope::{QueueClass, TaskOptions};
use imagepp_db::models::task::{NewTask, Task};
use imagepp_db::repositories::TaskRepo;
use sqlx::PgPool;

use crate::backoff::{self, FailOutcome};
use crate::{ClaimedTask, QueueError, TaskId, TaskQueue, DEFAULT_STALE_GRACE};

/// [`TaskQueue`] over PostgreSQL.
#[derive(Clone)]
pub struct PgTaskQueue {
    pool: PgPool,
    stale_grace: Duration,
}

impl PgTaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            stale_grace: DEFAULT_STALE_GRACE,
        }
    }

    pub fn with_stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }
}

fn clamp_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn claimed_from_row(row: Task, queue: QueueClass) -> ClaimedTask {
    ClaimedTask {
        id: row.id,
        task_type: row.task_type,
        queue,
        payload: row.payload,
        retried: row.retried.max(0) as u32,
        max_retry: row.max_retry.max(0) as u32,
        timeout: Duration::from_secs(row.timeout_secs.max(0) as u64),
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue(
        &self,
        task_type: &str,
        payload: serde_json::Value,
        options: TaskOptions,
    ) -> Result<TaskId, QueueError> {
        let input = NewTask {
            task_type: task_type.to_string(),
            queue: options.queue.as_str().to_string(),
            payload,
            max_retry: clamp_i32(options.max_retry as u64),
            timeout_secs: clamp_i32(options.timeout.as_secs()),
        };
        let task = TaskRepo::insert(&self.pool, &input).await?;
        tracing::debug!(task_id = task.id, task_type, queue = %options.queue, "Task enqueued");
        Ok(task.id)
    }

    async fn claim(&self, queue: QueueClass) -> Result<Option<ClaimedTask>, QueueError> {
        let row = TaskRepo::claim_next(&self.pool, queue.as_str()).await?;
        Ok(row.map(|row| claimed_from_row(row, queue)))
    }

    async fn complete(&self, task: &ClaimedTask) -> Result<(), QueueError> {
        if !TaskRepo::complete(&self.pool, task.id).await? {
            tracing::warn!(task_id = task.id, "Completed task was no longer active");
        }
        Ok(())
    }

    async fn fail(&self, task: &ClaimedTask, error: &str) -> Result<FailOutcome, QueueError> {
        let outcome = backoff::on_failure(task.retried, task.max_retry);
        let applied = match outcome {
            FailOutcome::Retry { delay, .. } => {
                TaskRepo::schedule_retry(&self.pool, task.id, error, delay.as_secs_f64()).await?
            }
            FailOutcome::Dead => TaskRepo::mark_dead(&self.pool, task.id, error).await?,
        };
        if !applied {
            tracing::warn!(task_id = task.id, "Failed task was no longer active");
        }
        Ok(outcome)
    }

    async fn recover_stale(&self) -> Result<u64, QueueError> {
        let grace = clamp_i32(self.stale_grace.as_secs());
        Ok(TaskRepo::recover_stale(&self.pool, grace).await?)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        imagepp_db::health_check(&self.pool)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }
}

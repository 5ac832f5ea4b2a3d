//! Repository for the `tasks` table, the durable broker state.
//!
//! Claiming uses `SELECT FOR UPDATE SKIP LOCKED` so any number of workers
//! can poll the same queue without double delivery of a claimable row.
//! Delivery is still at-least-once: a task whose worker dies stays `active`
//! until [`TaskRepo::recover_stale`] hands it out again.

use imagepp_core::status::{StatusId, TaskStatus};
use imagepp_core::types::DbId;
use sqlx::PgPool;

use crate::models::task::{NewTask, Task};

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, task_type, queue, payload, status_id, retried, max_retry, timeout_secs, \
    run_at, claimed_at, last_error, created_at, updated_at";

/// Statuses a worker may claim from.
const CLAIMABLE_STATUSES: [StatusId; 2] = [TaskStatus::Pending as StatusId, TaskStatus::Retry as StatusId];

/// Message recorded on tasks recovered from a lost worker.
const LEASE_EXPIRED: &str = "task lease expired before acknowledgement";

/// Provides broker operations over the `tasks` table.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a task, claimable immediately.
    pub async fn insert(pool: &PgPool, input: &NewTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (task_type, queue, payload, status_id, max_retry, timeout_secs) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.task_type)
            .bind(&input.queue)
            .bind(&input.payload)
            .bind(TaskStatus::Pending.id())
            .bind(input.max_retry)
            .bind(input.timeout_secs)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest due task on `queue`.
    pub async fn claim_next(pool: &PgPool, queue: &str) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET status_id = $2, claimed_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE queue = $1 AND status_id = ANY($3) AND run_at <= NOW() \
                 ORDER BY run_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(queue)
            .bind(TaskStatus::Active.id())
            .bind(&CLAIMABLE_STATUSES[..])
            .fetch_optional(pool)
            .await
    }

    /// Acknowledge a successful execution.
    pub async fn complete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET status_id = $2, claimed_at = NULL, last_error = NULL \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(TaskStatus::Completed.id())
        .bind(TaskStatus::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count a failed attempt and make the task claimable again after
    /// `delay_secs`.
    pub async fn schedule_retry(
        pool: &PgPool,
        id: DbId,
        error: &str,
        delay_secs: f64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, retried = retried + 1, claimed_at = NULL, last_error = $3, \
                 run_at = NOW() + make_interval(secs => $4) \
             WHERE id = $1 AND status_id = $5",
        )
        .bind(id)
        .bind(TaskStatus::Retry.id())
        .bind(error)
        .bind(delay_secs)
        .bind(TaskStatus::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Dead-letter a task whose retry budget is spent.
    pub async fn mark_dead(pool: &PgPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET status_id = $2, claimed_at = NULL, last_error = $3 \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(TaskStatus::Dead.id())
        .bind(error)
        .bind(TaskStatus::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return `active` tasks held past `timeout_secs + grace_secs` to the
    /// queue, or dead-letter them when their budget is spent.
    ///
    /// Returns the number of rows touched.
    pub async fn recover_stale(pool: &PgPool, grace_secs: i32) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks \
             SET status_id = CASE WHEN retried >= max_retry THEN $2 ELSE $3 END, \
                 retried = CASE WHEN retried >= max_retry THEN retried ELSE retried + 1 END, \
                 claimed_at = NULL, run_at = NOW(), last_error = $4 \
             WHERE status_id = $5 \
               AND claimed_at + make_interval(secs => (timeout_secs + $1)::double precision) < NOW()",
        )
        .bind(grace_secs)
        .bind(TaskStatus::Dead.id())
        .bind(TaskStatus::Retry.id())
        .bind(LEASE_EXPIRED)
        .bind(TaskStatus::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Number of tasks on `queue` in `status`.
    pub async fn count(pool: &PgPool, queue: &str, status: TaskStatus) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE queue = $1 AND status_id = $2")
            .bind(queue)
            .bind(status.id())
            .fetch_one(pool)
            .await
    }
}

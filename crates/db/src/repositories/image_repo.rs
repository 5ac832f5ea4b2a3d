//! Repository for the `images` table.
//!
//! Every status write after the insert is guarded: the `UPDATE` only matches
//! when the row currently holds one of the statuses returned by
//! [`JobStatus::allowed_predecessors`]. Callers learn from the returned
//! `bool` whether the write applied.

use imagepp_core::status::{JobStatus, StatusId};
use imagepp_core::types::DbId;
use sqlx::PgPool;

use crate::models::image::Image;

/// Column list for `images` queries.
const COLUMNS: &str = "\
    id, user_id, bucket_name, image_key, operations, status_id, \
    output_key, error_message, created_at, updated_at";

/// Job rows and their guarded status transitions.
pub struct ImageRepo;

fn predecessor_ids(next: JobStatus) -> Vec<StatusId> {
    next.allowed_predecessors().iter().map(|s| s.id()).collect()
}

impl ImageRepo {
    /// Insert a new job in `pending`.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        bucket_name: &str,
        image_key: &str,
        operations: &serde_json::Value,
    ) -> Result<Image, sqlx::Error> {
        let query = format!(
            "INSERT INTO images (user_id, bucket_name, image_key, operations, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Image>(&query)
            .bind(user_id)
            .bind(bucket_name)
            .bind(image_key)
            .bind(operations)
            .bind(JobStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Image>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM images WHERE id = $1");
        sqlx::query_as::<_, Image>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a job to `status` if its current status allows it.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: JobStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE images SET status_id = $2 WHERE id = $1 AND status_id = ANY($3)",
        )
        .bind(id)
        .bind(status.id())
        .bind(predecessor_ids(status))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful run: `completed` plus the uploaded output key.
    pub async fn mark_completed(
        pool: &PgPool,
        id: DbId,
        output_key: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE images \
             SET status_id = $2, output_key = $3, error_message = NULL \
             WHERE id = $1 AND status_id = ANY($4)",
        )
        .bind(id)
        .bind(JobStatus::Completed.id())
        .bind(output_key)
        .bind(predecessor_ids(JobStatus::Completed))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed attempt: `failed` plus the causal error message.
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE images \
             SET status_id = $2, error_message = $3 \
             WHERE id = $1 AND status_id = ANY($4)",
        )
        .bind(id)
        .bind(JobStatus::Failed.id())
        .bind(error)
        .bind(predecessor_ids(JobStatus::Failed))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

//! The Job Store seam.
//!
//! The submission service and the worker only ever see `dyn JobStore`, so
//! handles are passed in explicitly and tests can swap in
//! [`MemoryJobStore`](crate::memory::MemoryJobStore).

use async_trait::async_trait;
use imagepp_core::status::JobStatus;
use imagepp_core::types::DbId;
use sqlx::PgPool;

use crate::error::DbError;
use crate::models::image::{CreateImage, Image};
use crate::models::user::User;
use crate::repositories::{ImageRepo, UserRepo};

/// Persistence of users and image jobs.
///
/// Status writes return `Ok(false)` when the guarded transition did not
/// apply (the row is missing or its current status does not admit the
/// target). Only `create_image` ever produces a `pending` row.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    /// Fails with [`DbError::Conflict`] when the email is already taken.
    async fn create_user(&self, email: &str) -> Result<User, DbError>;

    async fn create_image(&self, input: &CreateImage) -> Result<Image, DbError>;

    /// Guarded status write. `Pending` is never accepted.
    async fn update_image_status(&self, id: DbId, status: JobStatus) -> Result<bool, DbError>;

    /// Guarded `processing -> completed`, recording the output key.
    async fn mark_completed(&self, id: DbId, output_key: &str) -> Result<bool, DbError>;

    /// Guarded `processing -> failed`, recording the error message.
    async fn mark_failed(&self, id: DbId, error: &str) -> Result<bool, DbError>;

    async fn find_image(&self, id: DbId) -> Result<Option<Image>, DbError>;

    /// Reachability probe used by the health endpoint.
    async fn ping(&self) -> Result<(), DbError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// [`JobStore`] backed by the `users` and `images` tables.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        Ok(UserRepo::find_by_email(&self.pool, email).await?)
    }

    async fn create_user(&self, email: &str) -> Result<User, DbError> {
        Ok(UserRepo::create(&self.pool, email).await?)
    }

    async fn create_image(&self, input: &CreateImage) -> Result<Image, DbError> {
        let operations = input
            .operations_json()
            .map_err(|e| DbError::Database(sqlx::Error::Encode(Box::new(e))))?;
        Ok(ImageRepo::create(
            &self.pool,
            input.user_id,
            &input.bucket_name,
            &input.image_key,
            &operations,
        )
        .await?)
    }

    async fn update_image_status(&self, id: DbId, status: JobStatus) -> Result<bool, DbError> {
        Ok(ImageRepo::update_status(&self.pool, id, status).await?)
    }

    async fn mark_completed(&self, id: DbId, output_key: &str) -> Result<bool, DbError> {
        Ok(ImageRepo::mark_completed(&self.pool, id, output_key).await?)
    }

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<bool, DbError> {
        Ok(ImageRepo::mark_failed(&self.pool, id, error).await?)
    }

    async fn find_image(&self, id: DbId) -> Result<Option<Image>, DbError> {
        Ok(ImageRepo::find_by_id(&self.pool, id).await?)
    }

    async fn ping(&self) -> Result<(), DbError> {
        crate::health_check(&self.pool)
            .await
            .map_err(|e| DbError::Unavailable(e.to_string()))
    }
}

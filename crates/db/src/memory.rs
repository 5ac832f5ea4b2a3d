//! In-process [`JobStore`] used by tests and local experiments.
//!
//! Applies the same guarded transitions and the same `uq_users_email`
//! uniqueness rule as the PostgreSQL tables.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use imagepp_core::status::JobStatus;
use imagepp_core::types::DbId;
use tokio::sync::Mutex;

use crate::error::DbError;
use crate::models::image::{CreateImage, Image};
use crate::models::user::User;
use crate::store::JobStore;

#[derive(Default)]
struct Tables {
    users: BTreeMap<DbId, User>,
    images: BTreeMap<DbId, Image>,
    next_user_id: DbId,
    next_image_id: DbId,
}

/// Memory-backed job store.
#[derive(Default)]
pub struct MemoryJobStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`DbError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of every job row, ordered by ID.
    pub async fn images(&self) -> Vec<Image> {
        self.tables.lock().await.images.values().cloned().collect()
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    fn check_available(&self) -> Result<(), DbError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }

    /// Apply a guarded write through `apply` when the transition is allowed.
    async fn transition(
        &self,
        id: DbId,
        next: JobStatus,
        apply: impl FnOnce(&mut Image),
    ) -> Result<bool, DbError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let Some(image) = tables.images.get_mut(&id) else {
            return Ok(false);
        };
        let allowed = image
            .status()
            .is_some_and(|current| current.can_transition_to(next));
        if !allowed {
            return Ok(false);
        }
        image.status_id = next.id();
        image.updated_at = Utc::now();
        apply(image);
        Ok(true)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, email: &str) -> Result<User, DbError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email == email) {
            return Err(DbError::Conflict("uq_users_email".into()));
        }
        tables.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: tables.next_user_id,
            email: email.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_image(&self, input: &CreateImage) -> Result<Image, DbError> {
        self.check_available()?;
        let operations = input
            .operations_json()
            .map_err(|e| DbError::Database(sqlx::Error::Encode(Box::new(e))))?;
        let mut tables = self.tables.lock().await;
        tables.next_image_id += 1;
        let now = Utc::now();
        let image = Image {
            id: tables.next_image_id,
            user_id: input.user_id,
            bucket_name: input.bucket_name.clone(),
            image_key: input.image_key.clone(),
            operations,
            status_id: JobStatus::Pending.id(),
            output_key: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        tables.images.insert(image.id, image.clone());
        Ok(image)
    }

    async fn update_image_status(&self, id: DbId, status: JobStatus) -> Result<bool, DbError> {
        self.transition(id, status, |_| {}).await
    }

    async fn mark_completed(&self, id: DbId, output_key: &str) -> Result<bool, DbError> {
        self.transition(id, JobStatus::Completed, |image| {
            image.output_key = Some(output_key.to_string());
            image.error_message = None;
        })
        .await
    }

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<bool, DbError> {
        self.transition(id, JobStatus::Failed, |image| {
            image.error_message = Some(error.to_string());
        })
        .await
    }

    async fn find_image(&self, id: DbId) -> Result<Option<Image>, DbError> {
        self.check_available()?;
        Ok(self.tables.lock().await.images.get(&id).cloned())
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.check_available()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn new_image(user_id: DbId) -> CreateImage {
        CreateImage {
            user_id,
            bucket_name: "bucket".into(),
            image_key: "k.jpg".into(),
            operations: vec![],
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryJobStore::new();
        store.create_user("a@x.com").await.unwrap();

        let err = store.create_user("a@x.com").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn new_images_start_pending() {
        let store = MemoryJobStore::new();
        let user = store.create_user("a@x.com").await.unwrap();
        let image = store.create_image(&new_image(user.id)).await.unwrap();

        assert_eq!(image.status(), Some(JobStatus::Pending));
        assert_eq!(image.user_id, user.id);
    }

    #[tokio::test]
    async fn guarded_transitions_follow_the_lifecycle() {
        let store = MemoryJobStore::new();
        let image = store.create_image(&new_image(1)).await.unwrap();

        // pending -> completed is not allowed.
        assert!(!store.mark_completed(image.id, "out").await.unwrap());
        assert!(store.update_image_status(image.id, JobStatus::Processing).await.unwrap());
        assert!(store.mark_failed(image.id, "boom").await.unwrap());
        // failed -> processing (broker retry) -> completed.
        assert!(store.update_image_status(image.id, JobStatus::Processing).await.unwrap());
        assert!(store.mark_completed(image.id, "processed/1.jpg").await.unwrap());

        let row = store.find_image(image.id).await.unwrap().unwrap();
        assert_eq!(row.status(), Some(JobStatus::Completed));
        assert_eq!(row.output_key.as_deref(), Some("processed/1.jpg"));
        assert_eq!(row.error_message, None);
    }

    #[tokio::test]
    async fn completed_rows_never_move() {
        let store = MemoryJobStore::new();
        let image = store.create_image(&new_image(1)).await.unwrap();
        store.update_image_status(image.id, JobStatus::Processing).await.unwrap();
        store.mark_completed(image.id, "out").await.unwrap();

        assert!(!store.update_image_status(image.id, JobStatus::Processing).await.unwrap());
        assert!(!store.mark_failed(image.id, "late").await.unwrap());
    }

    #[tokio::test]
    async fn missing_rows_are_not_updated() {
        let store = MemoryJobStore::new();
        assert!(!store.update_image_status(99, JobStatus::Processing).await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryJobStore::new();
        store.set_unavailable(true);
        assert_matches!(store.ping().await, Err(DbError::Unavailable(_)));
        assert_matches!(store.get_user_by_email("a@x.com").await, Err(DbError::Unavailable(_)));

        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}

//! Repository for the `users` table.

use imagepp_core::types::DbId;
use sqlx::PgPool;

use crate::models::user::User;

/// Column list for `users` queries.
const COLUMNS: &str = "id, email, created_at, updated_at";

/// Lookup and creation of submitting users.
pub struct UserRepo;

impl UserRepo {
    /// Find a user by exact email.
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Insert a user.
    ///
    /// Two submissions racing on the same new email make one of these
    /// inserts fail with a `uq_users_email` violation.
    pub async fn create(pool: &PgPool, email: &str) -> Result<User, sqlx::Error> {
        let query = format!("INSERT INTO users (email) VALUES ($1) RETURNING {COLUMNS}");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_one(pool)
            .await
    }
}

//! Persistence for users, image jobs and broker tasks.
//!
//! Repositories are zero-sized structs with async methods taking `&PgPool`.
//! The [`store::JobStore`] trait is the seam the submission service and the
//! worker depend on; [`store::PgJobStore`] backs it with the repositories and
//! [`memory::MemoryJobStore`] keeps everything in process for tests.

pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

use sqlx::postgres::PgPoolOptions;

pub use error::DbError;
pub use memory::MemoryJobStore;
pub use store::{JobStore, PgJobStore};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

use imagepp_db::DbError;

/// Broker failures.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Broker database error: {0}")]
    Database(#[source] DbError),

    #[error("Failed to serialize task payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

impl From<DbError> for QueueError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Unavailable(msg) => QueueError::Unavailable(msg),
            other => QueueError::Database(other),
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

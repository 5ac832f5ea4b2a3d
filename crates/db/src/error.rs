/// Errors surfaced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Any database failure not classified below.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A unique constraint (named `uq_*`) rejected the write.
    #[error("Conflict: duplicate value violates unique constraint {0}")]
    Conflict(String),

    /// The store could not be reached (pool exhausted, closed or I/O).
    #[error("Database unavailable: {0}")]
    Unavailable(String),
}

impl DbError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }
}

impl From<sqlx::Error> for DbError {
    /// PostgreSQL reports unique violations as SQLSTATE `23505`. Only
    /// constraints following the `uq_` naming convention become
    /// [`DbError::Conflict`].
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                match db_err.constraint() {
                    Some(constraint) if constraint.starts_with("uq_") => {
                        DbError::Conflict(constraint.to_string())
                    }
                    _ => DbError::Database(err),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::Unavailable(err.to_string())
            }
            _ => DbError::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn pool_timeout_is_unavailable() {
        assert_matches!(DbError::from(sqlx::Error::PoolTimedOut), DbError::Unavailable(_));
    }

    #[test]
    fn row_not_found_is_a_plain_database_error() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert_matches!(err, DbError::Database(sqlx::Error::RowNotFound));
        assert!(!err.is_conflict());
    }
}

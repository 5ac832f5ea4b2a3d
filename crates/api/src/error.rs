use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use imagepp_core::error::CoreError;
use imagepp_db::DbError;
use serde_json::json;

use crate::submission::SubmitError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`SubmitError`] for the
/// submission path. Implements [`IntoResponse`] to produce consistent JSON
/// error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `imagepp_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A submission that was not accepted.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// A Job Store error outside the submission path.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => internal(msg),
            },

            // --- Submission errors ---
            AppError::Submit(err) => match err {
                SubmitError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                SubmitError::Persistence(_) | SubmitError::Enqueue { .. } => {
                    internal(&err.to_string())
                }
            },

            // --- Database errors ---
            AppError::Database(err) => classify_db_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal(msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Log the detail and return a sanitized 500.
fn internal(detail: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %detail, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Classify a Job Store error into an HTTP status, error code, and message.
///
/// - Unique constraint violations map to 409.
/// - An unreachable store maps to 503.
/// - Everything else maps to 500 with a sanitized message.
fn classify_db_error(err: &DbError) -> (StatusCode, &'static str, String) {
    match err {
        DbError::Conflict(constraint) => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Duplicate value violates unique constraint: {constraint}"),
        ),
        DbError::Unavailable(msg) => {
            tracing::error!(error = %msg, "Job store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "The job store is unavailable".to_string(),
            )
        }
        DbError::Database(_) => internal(&err.to_string()),
    }
}

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use chrono::Utc;
use imagepp_core::envelope::{TaskOptions, TASK_TYPE_HEALTH_CHECK};
use imagepp_core::types::Timestamp;
use imagepp_db::JobStore;
use imagepp_queue::TaskQueue;
use serde::Serialize;
use serde_json::json;

use crate::state::AppState;

/// Outcome of each downstream check.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Job Store answered a ping.
    pub database: bool,
    /// Broker answered a ping.
    pub queue: bool,
    /// A no-op task was enqueued for the workers.
    pub worker_probe: bool,
}

impl HealthChecks {
    pub fn all_passed(&self) -> bool {
        self.database && self.queue && self.worker_probe
    }
}

/// Health check response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when every check passed, otherwise `degraded`.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub checks: HealthChecks,
    pub checked_at: Timestamp,
}

/// GET /health -- 200 when every downstream check passes, else 503.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = state
        .store
        .ping()
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Health check: job store unreachable"))
        .is_ok();

    let queue = state
        .queue
        .ping()
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Health check: broker unreachable"))
        .is_ok();

    let checked_at = Utc::now();
    let worker_probe = state
        .queue
        .enqueue(
            TASK_TYPE_HEALTH_CHECK,
            json!({ "requested_at": checked_at }),
            TaskOptions::health_check(),
        )
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Health check: probe enqueue failed"))
        .is_ok();

    let checks = HealthChecks {
        database,
        queue,
        worker_probe,
    };
    let (code, status) = if checks.all_passed() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            checks,
            checked_at,
        }),
    )
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

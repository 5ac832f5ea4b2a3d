//! Handlers for the `/images` resource.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use imagepp_core::error::CoreError;
use imagepp_core::request::ProcessImageRequest;
use imagepp_core::types::{DbId, Timestamp};
use imagepp_db::models::image::Image;
use imagepp_db::JobStore;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Job status as returned to pollers.
#[derive(Debug, Serialize)]
pub struct ImageStatusResponse {
    pub image_id: DbId,
    pub user_id: DbId,
    pub bucket_name: String,
    pub image_key: String,
    pub status: &'static str,
    pub output_key: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Image> for ImageStatusResponse {
    fn from(image: Image) -> Self {
        Self {
            image_id: image.id,
            user_id: image.user_id,
            bucket_name: image.bucket_name.clone(),
            image_key: image.image_key.clone(),
            status: image.status().map_or("unknown", |s| s.name()),
            output_key: image.output_key,
            error_message: image.error_message,
            created_at: image.created_at,
            updated_at: image.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/images
///
/// Accept an image transform job. Returns 202 once the job row exists and
/// its task is enqueued; processing happens asynchronously.
pub async fn submit_image(
    State(state): State<AppState>,
    body: Result<Json<ProcessImageRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = body.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let receipt = state.submissions.submit(input).await?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/images/{id}
pub async fn get_image(
    State(state): State<AppState>,
    Path(image_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let image = state
        .store
        .find_image(image_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Image",
            id: image_id,
        }))?;

    Ok(Json(ImageStatusResponse::from(image)))
}

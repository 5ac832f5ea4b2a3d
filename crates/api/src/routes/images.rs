//! Route definitions for the `/images` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::images;
use crate::state::AppState;

/// Routes mounted at `/images`.
///
/// ```text
/// POST   /                -> submit_image
/// GET    /{id}            -> get_image
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(images::submit_image))
        .route("/{id}", get(images::get_image))
}

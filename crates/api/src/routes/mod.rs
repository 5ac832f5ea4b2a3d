pub mod health;
pub mod images;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /images                 submit (POST)
/// /images/{id}            status (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/images", images::router())
}

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use imagepp_api::config::ServerConfig;
use imagepp_api::router::build_app_router;
use imagepp_api::state::AppState;
use imagepp_db::MemoryJobStore;
use imagepp_queue::MemoryTaskQueue;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 10,
        db_max_connections: 1,
    }
}

/// Router plus direct handles to its in-memory backends.
pub struct TestApp {
    pub store: Arc<MemoryJobStore>,
    pub queue: Arc<MemoryTaskQueue>,
    state: AppState,
}

impl TestApp {
    /// A fresh router over the shared backends. `oneshot` consumes the
    /// router, so build one per request.
    pub fn router(&self) -> Router {
        build_app_router(self.state.clone(), &test_config())
    }
}

/// Build the full application router, with the production middleware
/// stack, over in-memory backends.
pub fn build_test_app() -> TestApp {
    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryTaskQueue::new());
    let state = AppState::new(store.clone(), queue.clone(), test_config());
    TestApp { store, queue, state }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

use std::sync::Arc;

use imagepp_db::JobStore;
use imagepp_queue::TaskQueue;

use crate::config::ServerConfig;
use crate::submission::SubmissionService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Job Store (Postgres in production).
    pub store: Arc<dyn JobStore>,
    /// Broker the submission path and health probe enqueue onto.
    pub queue: Arc<dyn TaskQueue>,
    pub submissions: Arc<SubmissionService>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn TaskQueue>, config: ServerConfig) -> Self {
        let submissions = Arc::new(SubmissionService::new(
            Arc::clone(&store),
            Arc::clone(&queue),
        ));
        Self {
            store,
            queue,
            submissions,
            config: Arc::new(config),
        }
    }
}

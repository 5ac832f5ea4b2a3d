//! Task type routing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use imagepp_queue::ClaimedTask;

use crate::error::ProcessError;

/// Executes one task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &ClaimedTask) -> Result<(), ProcessError>;
}

/// Maps task types to their handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `task_type`, replacing any previous one.
    pub fn register(mut self, task_type: &str, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(task_type.to_string(), handler);
        self
    }

    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Run the handler registered for the task's type.
    pub async fn dispatch(&self, task: &ClaimedTask) -> Result<(), ProcessError> {
        let handler = self
            .handlers
            .get(&task.task_type)
            .ok_or_else(|| ProcessError::UnknownTaskType(task.task_type.clone()))?;
        handler.handle(task).await
    }
}

use async_trait::async_trait;
use imagepp_queue::ClaimedTask;

use crate::error::ProcessError;
use crate::handler::TaskHandler;

/// Handles `system:health_check` probes: reaching this handler proves the
/// broker-to-worker path is alive.
pub struct HealthCheckHandler;

#[async_trait]
impl TaskHandler for HealthCheckHandler {
    async fn handle(&self, task: &ClaimedTask) -> Result<(), ProcessError> {
        tracing::info!(task_id = task.id, queue = %task.queue, "Health check probe processed");
        Ok(())
    }
}

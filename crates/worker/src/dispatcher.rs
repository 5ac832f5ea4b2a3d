//! Worker dispatch loop.
//!
//! Each tick claims tasks until the queues are empty or every concurrency
//! permit is taken. Claimed tasks run on a [`JoinSet`]; when the
//! cancellation token fires, claiming stops and in-flight tasks get the
//! configured grace period before they are aborted. Aborted tasks stay
//! `active` in the broker and are redelivered by stale-task recovery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use imagepp_queue::{claim_weighted, ClaimedTask, FailOutcome, TaskQueue};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::ProcessError;
use crate::handler::HandlerRegistry;

/// Extra time past a task's own timeout before the dispatcher gives up on
/// it. Handlers that enforce the deadline themselves record it first.
const TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Background task dispatcher.
pub struct Dispatcher {
    queue: Arc<dyn TaskQueue>,
    registry: Arc<HandlerRegistry>,
    concurrency: usize,
    poll_interval: Duration,
    shutdown_timeout: Duration,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>, registry: HandlerRegistry, config: &WorkerConfig) -> Self {
        Self {
            queue,
            registry: Arc::new(registry),
            concurrency: config.concurrency.max(1),
            poll_interval: config.poll_interval,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Run the dispatch loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            concurrency = self.concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            task_types = ?self.registry.task_types(),
            "Task dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(in_flight = in_flight.len(), "Task dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.fill(&permits, &mut in_flight).await;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Task execution panicked");
                    }
                }
            }
        }

        self.drain(&mut in_flight).await;
    }

    /// Claim and spawn tasks while permits remain and work is due.
    async fn fill(&self, permits: &Arc<Semaphore>, in_flight: &mut JoinSet<()>) {
        loop {
            let Ok(permit) = Arc::clone(permits).try_acquire_owned() else {
                return;
            };

            let task = match claim_weighted(self.queue.as_ref()).await {
                Ok(Some(task)) => task,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim task");
                    return;
                }
            };

            let queue = Arc::clone(&self.queue);
            let registry = Arc::clone(&self.registry);
            in_flight.spawn(async move {
                let _permit = permit;
                let _ = execute_task(queue.as_ref(), &registry, task).await;
            });
        }
    }

    /// Wait up to the shutdown timeout for in-flight tasks, then abort.
    async fn drain(&self, in_flight: &mut JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }

        tracing::info!(
            in_flight = in_flight.len(),
            grace_secs = self.shutdown_timeout.as_secs(),
            "Waiting for in-flight tasks",
        );

        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                abandoned = in_flight.len(),
                "Shutdown grace period elapsed, aborting in-flight tasks",
            );
            in_flight.shutdown().await;
        }
    }
}

/// Run one claimed task and acknowledge the outcome to the broker.
///
/// Returns the handler's result after the acknowledgement was attempted.
pub async fn execute_task(
    queue: &dyn TaskQueue,
    registry: &HandlerRegistry,
    task: ClaimedTask,
) -> Result<(), ProcessError> {
    let started = Instant::now();
    tracing::info!(
        task_id = task.id,
        task_type = %task.task_type,
        queue = %task.queue,
        attempt = task.attempt(),
        "Task started",
    );

    let result = match tokio::time::timeout(task.timeout + TIMEOUT_SLACK, registry.dispatch(&task)).await {
        Ok(result) => result,
        Err(_) => Err(ProcessError::Timeout(task.timeout)),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(()) => {
            tracing::info!(task_id = task.id, task_type = %task.task_type, duration_ms, "Task completed");
            if let Err(e) = queue.complete(&task).await {
                tracing::error!(task_id = task.id, error = %e, "Failed to acknowledge task");
            }
        }
        Err(err) => {
            tracing::warn!(
                task_id = task.id,
                task_type = %task.task_type,
                attempt = task.attempt(),
                duration_ms,
                error = %err,
                "Task failed",
            );
            match queue.fail(&task, &err.to_string()).await {
                Ok(FailOutcome::Retry { delay, .. }) => {
                    tracing::info!(task_id = task.id, retry_in_secs = delay.as_secs(), "Task scheduled for retry");
                }
                Ok(FailOutcome::Dead) => {
                    tracing::error!(task_id = task.id, attempts = task.attempt(), "Task retry budget exhausted, dead-lettered");
                }
                Err(e) => {
                    tracing::error!(task_id = task.id, error = %e, "Failed to record task failure");
                }
            }
        }
    }

    result
}

//! In-process broker with the same claim, retry and dead-letter rules as
//! [`PgTaskQueue`](crate::postgres::PgTaskQueue).
//!
//! Time comes from `tokio::time`, so tests running with a paused clock can
//! step through backoff delays.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use imagepp_core::envelope::{QueueClass, TaskOptions};
use imagepp_core::status::TaskStatus;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::backoff::{self, FailOutcome};
use crate::{ClaimedTask, QueueError, TaskId, TaskQueue, DEFAULT_STALE_GRACE};

/// State of one stored task.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTask {
    pub id: TaskId,
    pub task_type: String,
    pub queue: QueueClass,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    pub retried: u32,
    pub max_retry: u32,
    pub timeout: Duration,
    pub run_at: Instant,
    pub claimed_at: Option<Instant>,
    pub last_error: Option<String>,
    /// Times this task has been handed to a worker.
    pub deliveries: u32,
}

#[derive(Default)]
struct State {
    next_id: TaskId,
    tasks: BTreeMap<TaskId, MemoryTask>,
}

/// Memory-backed [`TaskQueue`].
pub struct MemoryTaskQueue {
    state: Mutex<State>,
    unavailable: AtomicBool,
    stale_grace: Duration,
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            unavailable: AtomicBool::new(false),
            stale_grace: DEFAULT_STALE_GRACE,
        }
    }
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`QueueError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of every task, ordered by ID.
    pub async fn tasks(&self) -> Vec<MemoryTask> {
        self.state.lock().await.tasks.values().cloned().collect()
    }

    pub async fn task(&self, id: TaskId) -> Option<MemoryTask> {
        self.state.lock().await.tasks.get(&id).cloned()
    }

    /// Number of tasks currently in `status`.
    pub async fn count(&self, status: TaskStatus) -> usize {
        self.state
            .lock()
            .await
            .tasks
            .values()
            .filter(|t| t.status == status)
            .count()
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("memory broker marked unavailable".into()));
        }
        Ok(())
    }
}

fn is_claimable(task: &MemoryTask, queue: QueueClass, now: Instant) -> bool {
    task.queue == queue
        && matches!(task.status, TaskStatus::Pending | TaskStatus::Retry)
        && task.run_at <= now
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(
        &self,
        task_type: &str,
        payload: serde_json::Value,
        options: TaskOptions,
    ) -> Result<TaskId, QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.tasks.insert(
            id,
            MemoryTask {
                id,
                task_type: task_type.to_string(),
                queue: options.queue,
                payload,
                status: TaskStatus::Pending,
                retried: 0,
                max_retry: options.max_retry,
                timeout: options.timeout,
                run_at: Instant::now(),
                claimed_at: None,
                last_error: None,
                deliveries: 0,
            },
        );
        Ok(id)
    }

    async fn claim(&self, queue: QueueClass) -> Result<Option<ClaimedTask>, QueueError> {
        self.check_available()?;
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let next = state
            .tasks
            .values()
            .filter(|t| is_claimable(t, queue, now))
            .min_by_key(|t| (t.run_at, t.id))
            .map(|t| t.id);

        let Some(task) = next.and_then(|id| state.tasks.get_mut(&id)) else {
            return Ok(None);
        };

        task.status = TaskStatus::Active;
        task.claimed_at = Some(now);
        task.deliveries += 1;

        Ok(Some(ClaimedTask {
            id: task.id,
            task_type: task.task_type.clone(),
            queue: task.queue,
            payload: task.payload.clone(),
            retried: task.retried,
            max_retry: task.max_retry,
            timeout: task.timeout,
        }))
    }

    async fn complete(&self, task: &ClaimedTask) -> Result<(), QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(&task.id) {
            Some(stored) if stored.status == TaskStatus::Active => {
                stored.status = TaskStatus::Completed;
                stored.claimed_at = None;
                stored.last_error = None;
            }
            _ => tracing::warn!(task_id = task.id, "Completed task was no longer active"),
        }
        Ok(())
    }

    async fn fail(&self, task: &ClaimedTask, error: &str) -> Result<FailOutcome, QueueError> {
        self.check_available()?;
        let outcome = backoff::on_failure(task.retried, task.max_retry);
        let mut state = self.state.lock().await;

        let Some(stored) = state
            .tasks
            .get_mut(&task.id)
            .filter(|t| t.status == TaskStatus::Active)
        else {
            tracing::warn!(task_id = task.id, "Failed task was no longer active");
            return Ok(outcome);
        };

        stored.claimed_at = None;
        stored.last_error = Some(error.to_string());
        match outcome {
            FailOutcome::Retry { delay, retried } => {
                stored.status = TaskStatus::Retry;
                stored.retried = retried;
                stored.run_at = Instant::now() + delay;
            }
            FailOutcome::Dead => stored.status = TaskStatus::Dead,
        }
        Ok(outcome)
    }

    async fn recover_stale(&self) -> Result<u64, QueueError> {
        self.check_available()?;
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut recovered = 0;

        for task in state.tasks.values_mut() {
            let Some(claimed_at) = task.claimed_at else {
                continue;
            };
            if task.status != TaskStatus::Active || claimed_at + task.timeout + self.stale_grace >= now {
                continue;
            }
            task.claimed_at = None;
            task.run_at = now;
            task.last_error = Some("task lease expired before acknowledgement".into());
            if task.retried >= task.max_retry {
                task.status = TaskStatus::Dead;
            } else {
                task.status = TaskStatus::Retry;
                task.retried += 1;
            }
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.check_available()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use imagepp_core::envelope::TaskEnvelope;
    use serde_json::json;

    use super::*;
    use crate::enqueue_json;

    fn image_options() -> TaskOptions {
        TaskOptions::image_processing()
    }

    #[tokio::test]
    async fn claim_is_scoped_to_queue_class() {
        let queue = MemoryTaskQueue::new();
        queue.enqueue("process:image", json!({}), image_options()).await.unwrap();

        assert!(queue.claim(QueueClass::Low).await.unwrap().is_none());
        let task = queue.claim(QueueClass::Critical).await.unwrap().unwrap();
        assert_eq!(task.attempt(), 1);
        assert_eq!(task.max_retry, 3);
        assert_eq!(task.timeout, Duration::from_secs(600));

        // An active task is not handed out twice.
        assert!(queue.claim(QueueClass::Critical).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_json_stores_the_envelope_wire_form() {
        let queue = MemoryTaskQueue::new();
        let envelope = TaskEnvelope {
            image_id: 5,
            user_id: 2,
            bucket_name: "b".into(),
            image_key: "k.jpg".into(),
            operations: vec![],
        };
        let id = enqueue_json(&queue, "process:image", &envelope, image_options())
            .await
            .unwrap();

        let stored = queue.task(id).await.unwrap();
        assert_eq!(stored.payload["image_id"], 5);
        assert_eq!(stored.payload["bucket_name"], "b");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_back_off_exponentially() {
        let queue = MemoryTaskQueue::new();
        let id = queue.enqueue("process:image", json!({}), image_options()).await.unwrap();

        let task = queue.claim(QueueClass::Critical).await.unwrap().unwrap();
        let outcome = queue.fail(&task, "boom").await.unwrap();
        assert_eq!(outcome, FailOutcome::Retry { delay: Duration::from_secs(2), retried: 1 });

        // Not due yet.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(queue.claim(QueueClass::Critical).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(1)).await;
        let retry = queue.claim(QueueClass::Critical).await.unwrap().unwrap();
        assert_eq!(retry.id, id);
        assert_eq!(retry.attempt(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_dead_letters() {
        let queue = MemoryTaskQueue::new();
        let id = queue.enqueue("process:image", json!({}), image_options()).await.unwrap();

        let mut attempts = 0;
        loop {
            let Some(task) = queue.claim(QueueClass::Critical).await.unwrap() else {
                if queue.count(TaskStatus::Dead).await == 1 {
                    break;
                }
                tokio::time::advance(Duration::from_secs(1)).await;
                continue;
            };
            attempts += 1;
            queue.fail(&task, "still broken").await.unwrap();
        }

        assert_eq!(attempts, 4);
        let stored = queue.task(id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Dead);
        assert_eq!(stored.last_error.as_deref(), Some("still broken"));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_tasks_are_redelivered() {
        let queue = MemoryTaskQueue::new();
        let options = TaskOptions {
            timeout: Duration::from_secs(10),
            ..image_options()
        };
        queue.enqueue("process:image", json!({}), options).await.unwrap();
        queue.claim(QueueClass::Critical).await.unwrap().unwrap();

        assert_eq!(queue.recover_stale().await.unwrap(), 0);
        tokio::time::advance(Duration::from_secs(10) + DEFAULT_STALE_GRACE + Duration::from_secs(1)).await;
        assert_eq!(queue.recover_stale().await.unwrap(), 1);

        let again = queue.claim(QueueClass::Critical).await.unwrap().unwrap();
        assert_eq!(again.attempt(), 2);
    }

    #[tokio::test]
    async fn unavailable_broker_rejects_enqueue() {
        let queue = MemoryTaskQueue::new();
        queue.set_unavailable(true);
        assert_matches!(
            queue.enqueue("process:image", json!({}), image_options()).await,
            Err(QueueError::Unavailable(_))
        );
        assert!(queue.ping().await.is_err());
    }
}

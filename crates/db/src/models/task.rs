//! Broker task rows.

use imagepp_core::status::{StatusId, TaskStatus};
use imagepp_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `tasks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub task_type: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub status_id: StatusId,
    /// Failed attempts so far.
    pub retried: i32,
    pub max_retry: i32,
    pub timeout_secs: i32,
    /// Earliest time the task may be claimed.
    pub run_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::from_id(self.status_id)
    }
}

/// DTO for inserting a new task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub task_type: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub max_retry: i32,
    pub timeout_secs: i32,
}

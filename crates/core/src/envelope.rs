//! Task envelope: the unit of work handed to the broker.
//!
//! The payload schema is fixed:
//!
//! ```text
//! {image_id:int, user_id:int, bucket_name:string, image_key:string,
//!  operations:[{type:string, params:object}]}
//! ```
//!
//! Scheduling metadata (queue class, retry budget, timeout) travels beside
//! the payload as [`TaskOptions`], never inside it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::operation::Operation;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Task types
// ---------------------------------------------------------------------------

/// Task type of the image transform job.
pub const TASK_TYPE_IMAGE_PROCESS: &str = "process:image";

/// Task type of the no-op liveness probe enqueued by the health endpoint.
pub const TASK_TYPE_HEALTH_CHECK: &str = "system:health_check";

/// Retry budget for image tasks.
pub const IMAGE_TASK_MAX_RETRY: u32 = 3;

/// Execution timeout for image tasks.
pub const IMAGE_TASK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Execution timeout for health-check probes.
pub const HEALTH_TASK_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Queue classes
// ---------------------------------------------------------------------------

/// Priority class of a broker queue.
///
/// Classes are served by weighted fair scheduling, not preemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueClass {
    Critical,
    Default,
    Low,
}

impl QueueClass {
    /// Every class, heaviest first.
    pub const ALL: [QueueClass; 3] = [QueueClass::Critical, QueueClass::Default, QueueClass::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Default => "default",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(Self::Critical),
            "default" => Some(Self::Default),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Scheduling weight (critical:6, default:3, low:1).
    pub fn weight(self) -> u32 {
        match self {
            Self::Critical => 6,
            Self::Default => 3,
            Self::Low => 1,
        }
    }
}

impl std::fmt::Display for QueueClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Broker-side scheduling metadata for one enqueued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    pub queue: QueueClass,
    /// Retries allowed after the first failed attempt.
    pub max_retry: u32,
    /// Per-attempt execution timeout.
    pub timeout: Duration,
}

impl TaskOptions {
    /// Options for `process:image`: critical queue, 3 retries, 10 minutes.
    pub fn image_processing() -> Self {
        Self {
            queue: QueueClass::Critical,
            max_retry: IMAGE_TASK_MAX_RETRY,
            timeout: IMAGE_TASK_TIMEOUT,
        }
    }

    /// Options for the health-check probe: default queue, 3 retries.
    pub fn health_check() -> Self {
        Self {
            queue: QueueClass::Default,
            max_retry: 3,
            timeout: HEALTH_TASK_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Payload of a `process:image` task.
///
/// Missing fields decode to zero values so that [`TaskEnvelope::validate`]
/// reports them, rather than failing deserialization outright.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskEnvelope {
    pub image_id: DbId,
    pub user_id: DbId,
    pub bucket_name: String,
    pub image_key: String,
    pub operations: Vec<Operation>,
}

impl TaskEnvelope {
    /// Require a job id and a non-empty bucket and key.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.image_id == 0 || self.bucket_name.is_empty() || self.image_key.is_empty() {
            return Err(CoreError::Validation(
                "invalid job payload: missing required fields".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

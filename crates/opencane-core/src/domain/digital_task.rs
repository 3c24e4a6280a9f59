//! [`DigitalTask`]: the unit the Digital Task Executor (C9) schedules and
//! runs (spec §3, §4.9). Owned exclusively by the executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `pending -> running -> {success | failed | timeout | canceled}`.
/// Transitions are unidirectional into terminal states (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitalTaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
    Canceled,
}

impl DigitalTaskStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Timeout | Self::Canceled
        )
    }
}

/// One step of a task's append-only execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DigitalTask {
    pub task_id: String,
    pub session_id: String,
    pub device_id: String,
    pub goal: String,
    pub status: DigitalTaskStatus,
    pub steps: Vec<TaskStep>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub timeout_deadline: Option<DateTime<Utc>>,
    pub notify: bool,
    pub speak: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DigitalTask {
    #[must_use]
    pub fn new(
        task_id: String,
        session_id: String,
        device_id: String,
        goal: String,
        timeout_deadline: Option<DateTime<Utc>>,
        notify: bool,
        speak: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            session_id,
            device_id,
            goal,
            status: DigitalTaskStatus::Pending,
            steps: Vec::new(),
            result: None,
            error: None,
            timeout_deadline,
            notify,
            speak,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_step(&mut self, description: String, now: DateTime<Utc>) {
        self.steps.push(TaskStep {
            description,
            recorded_at: now,
        });
        self.updated_at = now;
    }

    /// Transition to a new status. Returns `false` (no-op) if the task is
    /// already in a terminal status — terminal statuses are sinks (spec §3
    /// invariant).
    pub fn transition(&mut self, status: DigitalTaskStatus, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.updated_at = now;
        true
    }
}

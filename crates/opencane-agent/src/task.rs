//! Digital-task state machine transition rules (spec §4.9, C9 pure half).
//!
//! `pending -> running -> {success | failed | timeout | canceled}`.
//! Transitions are unidirectional into terminal states; terminal statuses
//! are sinks (spec §3 invariant). The scheduling, persistence, and MCP/
//! fallback execution strategy around these rules live in
//! `opencane-runtime::task`.

use chrono::{DateTime, Utc};
use opencane_core::domain::{DigitalTask, DigitalTaskStatus};

/// An event applied to a [`DigitalTask`]'s state machine.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Start,
    Succeed(Option<String>),
    Fail(String),
    TimeoutExpired,
    Cancel(String),
}

impl TaskEvent {
    #[must_use]
    const fn target_status(&self) -> DigitalTaskStatus {
        match self {
            Self::Start => DigitalTaskStatus::Running,
            Self::Succeed(_) => DigitalTaskStatus::Success,
            Self::Fail(_) => DigitalTaskStatus::Failed,
            Self::TimeoutExpired => DigitalTaskStatus::Timeout,
            Self::Cancel(_) => DigitalTaskStatus::Canceled,
        }
    }
}

/// Whether transitioning from `from` to `to` is legal under the state
/// machine in spec §4.9.
#[must_use]
pub const fn is_legal_transition(from: DigitalTaskStatus, to: DigitalTaskStatus) -> bool {
    use DigitalTaskStatus::{Canceled, Failed, Pending, Running, Success, Timeout};
    match (from, to) {
        (Pending, Running | Canceled) => true,
        (Running, Success | Failed | Timeout | Canceled) => true,
        // Terminal statuses are sinks: no outbound transition is legal.
        (Success | Failed | Timeout | Canceled, _) => false,
        _ => false,
    }
}

/// The outcome of applying a [`TaskEvent`] to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTransition {
    pub from: DigitalTaskStatus,
    pub to: DigitalTaskStatus,
    /// `false` when the event was rejected (illegal transition) or the task
    /// was already terminal (a no-op, not an error — spec §8 boundary
    /// behavior for `interrupt_previous` generalizes to every terminal-sink
    /// rule here).
    pub applied: bool,
}

/// Apply `event` to `task`, mutating it in place if the transition is legal.
/// Returns the transition record either way so callers can decide whether a
/// `task_update` push is owed (spec §4.9: "on every status transition, if
/// `notify=true`, enqueue a `task_update`").
pub fn apply_event(task: &mut DigitalTask, event: &TaskEvent, now: DateTime<Utc>) -> TaskTransition {
    let from = task.status;
    let to = event.target_status();

    if !is_legal_transition(from, to) {
        tracing::debug!(task_id = %task.task_id, ?from, ?to, "rejected illegal task transition");
        return TaskTransition {
            from,
            to: from,
            applied: false,
        };
    }

    match event {
        TaskEvent::Succeed(result) => task.result = result.clone(),
        TaskEvent::Fail(error) | TaskEvent::Cancel(error) => task.error = Some(error.clone()),
        TaskEvent::TimeoutExpired => task.error = Some("deadline exceeded".to_string()),
        TaskEvent::Start => {}
    }

    let applied = task.transition(to, now);
    TaskTransition { from, to, applied }
}

/// `interrupt_previous=true` on execute: cancel any non-terminal task on the
/// same device before creating the new one. No-op, not an error, if `task`
/// is already terminal (spec §8 boundary behavior).
pub fn interrupt_previous(task: &mut DigitalTask, now: DateTime<Utc>) -> TaskTransition {
    apply_event(task, &TaskEvent::Cancel("interrupt_previous".to_string()), now)
}

/// A non-terminal task whose `timeout_deadline` has passed expires to
/// `timeout` (spec §4.9 recovery rule).
#[must_use]
pub fn is_past_deadline(task: &DigitalTask, now: DateTime<Utc>) -> bool {
    !task.status.is_terminal() && task.timeout_deadline.is_some_and(|deadline| deadline <= now)
}

//! ID generation shared across components that mint new `job_id`/`task_id`/
//! `operation_id`/`msg_id`/`trace_id` values.

use uuid::Uuid;

/// A new random v4 UUID rendered as a hyphenated string.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

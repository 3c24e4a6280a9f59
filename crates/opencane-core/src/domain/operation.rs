//! [`Operation`]: an outbound command's push lifecycle record (spec §3
//! `OperationLog`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Queued,
    Sent,
    Acked,
    Failed,
    Canceled,
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub operation_id: String,
    pub device_id: String,
    pub command_type: String,
    pub payload: Value,
    pub status: OperationStatus,
    pub attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl Operation {
    #[must_use]
    pub fn new(operation_id: String, device_id: String, command_type: String, payload: Value) -> Self {
        Self {
            operation_id,
            device_id,
            command_type,
            payload,
            status: OperationStatus::Queued,
            attempts: 0,
            next_attempt_at: None,
        }
    }
}

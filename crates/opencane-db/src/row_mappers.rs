//! Row <-> domain-type conversion helpers shared by [`crate::sqlite_store`].

use chrono::{DateTime, Utc};
use opencane_core::domain::{DigitalTaskStatus, OperationStatus};
use opencane_core::ports::StoreError;

pub fn format_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn parse_dt(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("invalid timestamp {raw:?}: {e}")))
}

pub fn task_status_to_str(status: DigitalTaskStatus) -> &'static str {
    match status {
        DigitalTaskStatus::Pending => "pending",
        DigitalTaskStatus::Running => "running",
        DigitalTaskStatus::Success => "success",
        DigitalTaskStatus::Failed => "failed",
        DigitalTaskStatus::Timeout => "timeout",
        DigitalTaskStatus::Canceled => "canceled",
    }
}

pub fn task_status_from_str(raw: &str) -> Result<DigitalTaskStatus, StoreError> {
    match raw {
        "pending" => Ok(DigitalTaskStatus::Pending),
        "running" => Ok(DigitalTaskStatus::Running),
        "success" => Ok(DigitalTaskStatus::Success),
        "failed" => Ok(DigitalTaskStatus::Failed),
        "timeout" => Ok(DigitalTaskStatus::Timeout),
        "canceled" => Ok(DigitalTaskStatus::Canceled),
        other => Err(StoreError::Backend(format!("unknown digital task status {other:?}"))),
    }
}

pub fn operation_status_to_str(status: OperationStatus) -> &'static str {
    match status {
        OperationStatus::Queued => "queued",
        OperationStatus::Sent => "sent",
        OperationStatus::Acked => "acked",
        OperationStatus::Failed => "failed",
        OperationStatus::Canceled => "canceled",
    }
}

pub fn operation_status_from_str(raw: &str) -> Result<OperationStatus, StoreError> {
    match raw {
        "queued" => Ok(OperationStatus::Queued),
        "sent" => Ok(OperationStatus::Sent),
        "acked" => Ok(OperationStatus::Acked),
        "failed" => Ok(OperationStatus::Failed),
        "canceled" => Ok(OperationStatus::Canceled),
        other => Err(StoreError::Backend(format!("unknown operation status {other:?}"))),
    }
}

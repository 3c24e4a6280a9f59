//! `SQLite` implementation of the [`Store`] port (spec §6.3, §6.4).
//!
//! One struct wrapping a `sqlx::SqlitePool`, one `impl Store for SqliteStore`
//! covering all nine logical tables, mirroring the teacher's
//! one-repository-per-trait shape collapsed into a single trait because
//! `Store` (unlike the teacher's per-resource repositories) is one port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use opencane_core::domain::{DigitalTask, DigitalTaskStatus, Operation, OperationStatus, TaskStep};
use opencane_core::ports::{
    LifelogContext, LifelogImageRecord, ObservabilitySample, SafetyAudit, SessionSnapshot, Store,
    StoreError, TaskPush,
};

use crate::row_mappers::{
    format_dt, operation_status_from_str, operation_status_to_str, parse_dt, task_status_from_str,
    task_status_to_str,
};

fn storage_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn json_err(e: serde_json::Error) -> StoreError {
    StoreError::Backend(format!("json encode/decode failed: {e}"))
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DigitalTask, StoreError> {
    let status_raw: String = row.try_get("status").map_err(storage_err)?;
    let steps_raw: String = row.try_get("steps").map_err(storage_err)?;
    let timeout_deadline_raw: Option<String> = row.try_get("timeout_deadline").map_err(storage_err)?;
    let created_at_raw: String = row.try_get("created_at").map_err(storage_err)?;
    let updated_at_raw: String = row.try_get("updated_at").map_err(storage_err)?;

    let steps: Vec<TaskStep> = serde_json::from_str(&steps_raw).map_err(json_err)?;
    let timeout_deadline = timeout_deadline_raw.map(|s| parse_dt(&s)).transpose()?;

    Ok(DigitalTask {
        task_id: row.try_get("task_id").map_err(storage_err)?,
        session_id: row.try_get("session_id").map_err(storage_err)?,
        device_id: row.try_get("device_id").map_err(storage_err)?,
        goal: row.try_get("goal").map_err(storage_err)?,
        status: task_status_from_str(&status_raw)?,
        steps,
        result: row.try_get("result").map_err(storage_err)?,
        error: row.try_get("error").map_err(storage_err)?,
        timeout_deadline,
        notify: row.try_get::<i64, _>("notify").map_err(storage_err)? != 0,
        speak: row.try_get::<i64, _>("speak").map_err(storage_err)? != 0,
        created_at: parse_dt(&created_at_raw)?,
        updated_at: parse_dt(&updated_at_raw)?,
    })
}

fn operation_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Operation, StoreError> {
    let status_raw: String = row.try_get("status").map_err(storage_err)?;
    let payload_raw: String = row.try_get("payload").map_err(storage_err)?;
    let next_attempt_raw: Option<String> = row.try_get("next_attempt_at").map_err(storage_err)?;

    Ok(Operation {
        operation_id: row.try_get("operation_id").map_err(storage_err)?,
        device_id: row.try_get("device_id").map_err(storage_err)?,
        command_type: row.try_get("command_type").map_err(storage_err)?,
        payload: serde_json::from_str(&payload_raw).map_err(json_err)?,
        status: operation_status_from_str(&status_raw)?,
        attempts: u32::try_from(row.try_get::<i64, _>("attempts").map_err(storage_err)?).unwrap_or(0),
        next_attempt_at: next_attempt_raw.map(|s| parse_dt(&s)).transpose()?,
    })
}

fn task_push_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TaskPush, StoreError> {
    let status_raw: String = row.try_get("status").map_err(storage_err)?;
    let next_attempt_raw: String = row.try_get("next_attempt_at").map_err(storage_err)?;
    Ok(TaskPush {
        push_id: row.try_get("push_id").map_err(storage_err)?,
        device_id: row.try_get("device_id").map_err(storage_err)?,
        task_id: row.try_get("task_id").map_err(storage_err)?,
        status: task_status_from_str(&status_raw)?,
        message: row.try_get("message").map_err(storage_err)?,
        attempts: u32::try_from(row.try_get::<i64, _>("attempts").map_err(storage_err)?).unwrap_or(0),
        next_attempt_at: parse_dt(&next_attempt_raw)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_session_snapshot(&self, snapshot: SessionSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO device_sessions (device_id, session_id, state, last_recv_seq, next_outbound_seq, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (device_id, session_id) DO UPDATE SET
                state = excluded.state,
                last_recv_seq = excluded.last_recv_seq,
                next_outbound_seq = excluded.next_outbound_seq,
                last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(&snapshot.device_id)
        .bind(&snapshot.session_id)
        .bind(&snapshot.state)
        .bind(i64::try_from(snapshot.last_recv_seq).unwrap_or(i64::MAX))
        .bind(i64::try_from(snapshot.next_outbound_seq).unwrap_or(i64::MAX))
        .bind(format_dt(snapshot.last_seen_at))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn load_session_snapshot(
        &self,
        device_id: &str,
        session_id: &str,
    ) -> Result<Option<SessionSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT device_id, session_id, state, last_recv_seq, next_outbound_seq, last_seen_at FROM device_sessions WHERE device_id = ? AND session_id = ?",
        )
        .bind(device_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else { return Ok(None) };
        let last_seen_at: String = row.try_get("last_seen_at").map_err(storage_err)?;
        Ok(Some(SessionSnapshot {
            device_id: row.try_get("device_id").map_err(storage_err)?,
            session_id: row.try_get("session_id").map_err(storage_err)?,
            state: row.try_get("state").map_err(storage_err)?,
            last_recv_seq: u64::try_from(row.try_get::<i64, _>("last_recv_seq").map_err(storage_err)?).unwrap_or(0),
            next_outbound_seq: u64::try_from(row.try_get::<i64, _>("next_outbound_seq").map_err(storage_err)?)
                .unwrap_or(0),
            last_seen_at: parse_dt(&last_seen_at)?,
        }))
    }

    async fn insert_lifelog_event(
        &self,
        session_id: &str,
        kind: &str,
        payload: Value,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let payload_json = serde_json::to_string(&payload).map_err(json_err)?;
        sqlx::query(
            "INSERT INTO lifelog_events (session_id, kind, payload, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(kind)
        .bind(payload_json)
        .bind(format_dt(recorded_at))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn query_lifelog_timeline(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<(DateTime<Utc>, String, Value)>, StoreError> {
        let rows = sqlx::query(
            "SELECT kind, payload, recorded_at FROM lifelog_events WHERE session_id = ? ORDER BY recorded_at DESC LIMIT ?",
        )
        .bind(session_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind").map_err(storage_err)?;
                let payload_raw: String = row.try_get("payload").map_err(storage_err)?;
                let recorded_at_raw: String = row.try_get("recorded_at").map_err(storage_err)?;
                Ok((
                    parse_dt(&recorded_at_raw)?,
                    kind,
                    serde_json::from_str(&payload_raw).map_err(json_err)?,
                ))
            })
            .collect()
    }

    async fn insert_lifelog_image(&self, record: LifelogImageRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO lifelog_images (job_id, session_id, content_hash, dhash, asset_uri, recorded_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.job_id)
        .bind(&record.session_id)
        .bind(&record.content_hash)
        .bind(i64::try_from(record.dhash).unwrap_or(i64::MAX))
        .bind(&record.asset_uri)
        .bind(format_dt(record.recorded_at))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn recent_lifelog_images(
        &self,
        session_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<LifelogImageRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT job_id, session_id, content_hash, dhash, asset_uri, recorded_at FROM lifelog_images WHERE session_id = ? AND recorded_at >= ? ORDER BY recorded_at DESC",
        )
        .bind(session_id)
        .bind(format_dt(since))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| {
                let recorded_at_raw: String = row.try_get("recorded_at").map_err(storage_err)?;
                Ok(LifelogImageRecord {
                    job_id: row.try_get("job_id").map_err(storage_err)?,
                    session_id: row.try_get("session_id").map_err(storage_err)?,
                    content_hash: row.try_get("content_hash").map_err(storage_err)?,
                    dhash: u64::try_from(row.try_get::<i64, _>("dhash").map_err(storage_err)?).unwrap_or(0),
                    asset_uri: row.try_get("asset_uri").map_err(storage_err)?,
                    recorded_at: parse_dt(&recorded_at_raw)?,
                })
            })
            .collect()
    }

    async fn insert_lifelog_context(&self, context: LifelogContext) -> Result<(), StoreError> {
        let structured_json = serde_json::to_string(&context.structured).map_err(json_err)?;
        sqlx::query(
            "INSERT INTO lifelog_contexts (job_id, session_id, summary, structured, recorded_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&context.job_id)
        .bind(&context.session_id)
        .bind(&context.summary)
        .bind(structured_json)
        .bind(format_dt(context.recorded_at))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn lifelog_context_for_job(&self, job_id: &str) -> Result<Option<LifelogContext>, StoreError> {
        let row = sqlx::query(
            "SELECT job_id, session_id, summary, structured, recorded_at FROM lifelog_contexts WHERE job_id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else { return Ok(None) };
        let structured_raw: String = row.try_get("structured").map_err(storage_err)?;
        let recorded_at_raw: String = row.try_get("recorded_at").map_err(storage_err)?;
        Ok(Some(LifelogContext {
            job_id: row.try_get("job_id").map_err(storage_err)?,
            session_id: row.try_get("session_id").map_err(storage_err)?,
            summary: row.try_get("summary").map_err(storage_err)?,
            structured: serde_json::from_str(&structured_raw).map_err(json_err)?,
            recorded_at: parse_dt(&recorded_at_raw)?,
        }))
    }

    async fn insert_task(&self, task: &DigitalTask) -> Result<(), StoreError> {
        let steps_json = serde_json::to_string(&task.steps).map_err(json_err)?;
        sqlx::query(
            r#"
            INSERT INTO digital_tasks
                (task_id, session_id, device_id, goal, status, steps, result, error, timeout_deadline, notify, speak, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.task_id)
        .bind(&task.session_id)
        .bind(&task.device_id)
        .bind(&task.goal)
        .bind(task_status_to_str(task.status))
        .bind(steps_json)
        .bind(&task.result)
        .bind(&task.error)
        .bind(task.timeout_deadline.map(format_dt))
        .bind(i64::from(task.notify))
        .bind(i64::from(task.speak))
        .bind(format_dt(task.created_at))
        .bind(format_dt(task.updated_at))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn update_task(&self, task: &DigitalTask) -> Result<(), StoreError> {
        let steps_json = serde_json::to_string(&task.steps).map_err(json_err)?;
        sqlx::query(
            r#"
            UPDATE digital_tasks SET
                status = ?, steps = ?, result = ?, error = ?, timeout_deadline = ?,
                notify = ?, speak = ?, updated_at = ?
            WHERE task_id = ?
            "#,
        )
        .bind(task_status_to_str(task.status))
        .bind(steps_json)
        .bind(&task.result)
        .bind(&task.error)
        .bind(task.timeout_deadline.map(format_dt))
        .bind(i64::from(task.notify))
        .bind(i64::from(task.speak))
        .bind(format_dt(task.updated_at))
        .bind(&task.task_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn load_task(&self, task_id: &str) -> Result<Option<DigitalTask>, StoreError> {
        let row = sqlx::query("SELECT * FROM digital_tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn list_tasks_for_device(&self, device_id: &str) -> Result<Vec<DigitalTask>, StoreError> {
        let rows = sqlx::query("SELECT * FROM digital_tasks WHERE device_id = ? ORDER BY created_at DESC")
            .bind(device_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(task_from_row).collect()
    }

    async fn list_non_terminal_tasks(&self) -> Result<Vec<DigitalTask>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM digital_tasks WHERE status IN ('pending', 'running') ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(task_from_row).collect()
    }

    async fn find_non_terminal_task_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<DigitalTask>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM digital_tasks WHERE device_id = ? AND status IN ('pending', 'running') ORDER BY created_at DESC LIMIT 1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn enqueue_task_push(
        &self,
        device_id: &str,
        task_id: &str,
        status: DigitalTaskStatus,
        message: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO digital_task_push_queue (push_id, device_id, task_id, status, message, attempts, next_attempt_at, sent)
            VALUES (?, ?, ?, ?, ?, 0, ?, 0)
            ON CONFLICT (device_id, task_id, status) DO UPDATE SET
                message = excluded.message,
                next_attempt_at = excluded.next_attempt_at,
                sent = 0
            "#,
        )
        .bind(opencane_core::ids::new_id())
        .bind(device_id)
        .bind(task_id)
        .bind(task_status_to_str(status))
        .bind(message)
        .bind(format_dt(next_attempt_at))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn due_task_pushes(&self, now: DateTime<Utc>) -> Result<Vec<TaskPush>, StoreError> {
        let rows = sqlx::query(
            "SELECT push_id, device_id, task_id, status, message, attempts, next_attempt_at FROM digital_task_push_queue WHERE sent = 0 AND next_attempt_at <= ? ORDER BY next_attempt_at ASC",
        )
        .bind(format_dt(now))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(task_push_from_row).collect()
    }

    async fn mark_task_push_sent(&self, push_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE digital_task_push_queue SET sent = 1 WHERE push_id = ?")
            .bind(push_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn reschedule_task_push(
        &self,
        push_id: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE digital_task_push_queue SET attempts = attempts + 1, next_attempt_at = ? WHERE push_id = ?",
        )
        .bind(format_dt(next_attempt_at))
        .bind(push_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn pending_task_pushes_for_device(&self, device_id: &str) -> Result<Vec<TaskPush>, StoreError> {
        let rows = sqlx::query(
            "SELECT push_id, device_id, task_id, status, message, attempts, next_attempt_at FROM digital_task_push_queue WHERE device_id = ? AND sent = 0 ORDER BY next_attempt_at ASC",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(task_push_from_row).collect()
    }

    async fn enqueue_operation(&self, operation: &Operation) -> Result<(), StoreError> {
        let payload_json = serde_json::to_string(&operation.payload).map_err(json_err)?;
        sqlx::query(
            r#"
            INSERT INTO device_operations (operation_id, device_id, command_type, payload, status, attempts, next_attempt_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&operation.operation_id)
        .bind(&operation.device_id)
        .bind(&operation.command_type)
        .bind(payload_json)
        .bind(operation_status_to_str(operation.status))
        .bind(i64::from(operation.attempts))
        .bind(operation.next_attempt_at.map(format_dt))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn mark_operation_status(
        &self,
        operation_id: &str,
        status: OperationStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE device_operations SET status = ? WHERE operation_id = ?")
            .bind(operation_status_to_str(status))
            .bind(operation_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn query_operations(&self, device_id: &str) -> Result<Vec<Operation>, StoreError> {
        let rows = sqlx::query("SELECT * FROM device_operations WHERE device_id = ? ORDER BY rowid DESC")
            .bind(device_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(operation_from_row).collect()
    }

    async fn insert_thought_trace(
        &self,
        session_id: &str,
        task_id: Option<&str>,
        trace: Value,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let trace_json = serde_json::to_string(&trace).map_err(json_err)?;
        sqlx::query(
            "INSERT INTO thought_traces (session_id, task_id, trace, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(task_id)
        .bind(trace_json)
        .bind(format_dt(recorded_at))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn record_safety_audit(&self, audit: SafetyAudit) -> Result<(), StoreError> {
        let payload = serde_json::json!({
            "trace_id": audit.trace_id,
            "source": audit.source,
            "downgraded": audit.downgraded,
            "rule_ids": audit.rule_ids,
        });
        self.insert_lifelog_event(
            audit.session_id.as_deref().unwrap_or("unknown"),
            "safety_policy",
            payload,
            audit.recorded_at,
        )
        .await
    }

    async fn query_safety_audits(
        &self,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SafetyAudit>, StoreError> {
        let rows = if let Some(session_id) = session_id {
            sqlx::query(
                "SELECT session_id, payload, recorded_at FROM lifelog_events WHERE kind = 'safety_policy' AND session_id = ? ORDER BY recorded_at DESC LIMIT ?",
            )
            .bind(session_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                "SELECT session_id, payload, recorded_at FROM lifelog_events WHERE kind = 'safety_policy' ORDER BY recorded_at DESC LIMIT ?",
            )
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
        }
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| {
                let session_id: String = row.try_get("session_id").map_err(storage_err)?;
                let payload_raw: String = row.try_get("payload").map_err(storage_err)?;
                let recorded_at_raw: String = row.try_get("recorded_at").map_err(storage_err)?;
                let payload: Value = serde_json::from_str(&payload_raw).map_err(json_err)?;
                Ok(SafetyAudit {
                    trace_id: payload.get("trace_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    session_id: Some(session_id),
                    source: payload.get("source").and_then(Value::as_str).unwrap_or_default().to_string(),
                    downgraded: payload.get("downgraded").and_then(Value::as_bool).unwrap_or(false),
                    rule_ids: payload
                        .get("rule_ids")
                        .and_then(Value::as_array)
                        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                        .unwrap_or_default(),
                    recorded_at: parse_dt(&recorded_at_raw)?,
                })
            })
            .collect()
    }

    async fn insert_observability_sample(&self, sample: ObservabilitySample) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO runtime_observability_samples
                (recorded_at, session_count, ingest_queue_depth, ingest_queue_capacity, push_queue_backlog)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(format_dt(sample.recorded_at))
        .bind(i64::try_from(sample.session_count).unwrap_or(i64::MAX))
        .bind(i64::try_from(sample.ingest_queue_depth).unwrap_or(i64::MAX))
        .bind(i64::try_from(sample.ingest_queue_capacity).unwrap_or(i64::MAX))
        .bind(i64::try_from(sample.push_queue_backlog).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn observability_history(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ObservabilitySample>, StoreError> {
        let rows = sqlx::query(
            "SELECT recorded_at, session_count, ingest_queue_depth, ingest_queue_capacity, push_queue_backlog FROM runtime_observability_samples WHERE recorded_at >= ? ORDER BY recorded_at ASC",
        )
        .bind(format_dt(since))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| {
                let recorded_at_raw: String = row.try_get("recorded_at").map_err(storage_err)?;
                Ok(ObservabilitySample {
                    recorded_at: parse_dt(&recorded_at_raw)?,
                    session_count: u64::try_from(row.try_get::<i64, _>("session_count").map_err(storage_err)?)
                        .unwrap_or(0),
                    ingest_queue_depth: u64::try_from(
                        row.try_get::<i64, _>("ingest_queue_depth").map_err(storage_err)?,
                    )
                    .unwrap_or(0),
                    ingest_queue_capacity: u64::try_from(
                        row.try_get::<i64, _>("ingest_queue_capacity").map_err(storage_err)?,
                    )
                    .unwrap_or(0),
                    push_queue_backlog: u64::try_from(
                        row.try_get::<i64, _>("push_queue_backlog").map_err(storage_err)?,
                    )
                    .unwrap_or(0),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;

    #[tokio::test]
    async fn session_snapshot_round_trips() {
        let pool = setup_test_database().await.unwrap();
        let store = SqliteStore::new(pool);
        let now = Utc::now();
        store
            .upsert_session_snapshot(SessionSnapshot {
                device_id: "dev-1".to_string(),
                session_id: "sess-1".to_string(),
                state: "active".to_string(),
                last_recv_seq: 4,
                next_outbound_seq: 5,
                last_seen_at: now,
            })
            .await
            .unwrap();

        let loaded = store.load_session_snapshot("dev-1", "sess-1").await.unwrap().unwrap();
        assert_eq!(loaded.last_recv_seq, 4);
        assert_eq!(loaded.next_outbound_seq, 5);
    }

    #[tokio::test]
    async fn digital_task_insert_and_update_round_trips() {
        let pool = setup_test_database().await.unwrap();
        let store = SqliteStore::new(pool);
        let now = Utc::now();
        let mut task = DigitalTask::new(
            "task-1".to_string(),
            "sess-1".to_string(),
            "dev-1".to_string(),
            "book a ride".to_string(),
            None,
            true,
            false,
            now,
        );
        store.insert_task(&task).await.unwrap();

        task.transition(DigitalTaskStatus::Running, now);
        task.push_step("called dispatcher".to_string(), now);
        store.update_task(&task).await.unwrap();

        let loaded = store.load_task("task-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, DigitalTaskStatus::Running);
        assert_eq!(loaded.steps.len(), 1);
    }

    #[tokio::test]
    async fn non_terminal_task_lookup_excludes_terminal_tasks() {
        let pool = setup_test_database().await.unwrap();
        let store = SqliteStore::new(pool);
        let now = Utc::now();
        let mut task = DigitalTask::new(
            "task-2".to_string(),
            "sess-1".to_string(),
            "dev-2".to_string(),
            "turn off the lights".to_string(),
            None,
            true,
            false,
            now,
        );
        store.insert_task(&task).await.unwrap();
        assert!(store.find_non_terminal_task_for_device("dev-2").await.unwrap().is_some());

        task.transition(DigitalTaskStatus::Success, now);
        store.update_task(&task).await.unwrap();
        assert!(store.find_non_terminal_task_for_device("dev-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn task_push_queue_due_and_reschedule() {
        let pool = setup_test_database().await.unwrap();
        let store = SqliteStore::new(pool);
        let now = Utc::now();
        store
            .enqueue_task_push("dev-1", "task-1", DigitalTaskStatus::Success, "done", now - chrono::Duration::seconds(1))
            .await
            .unwrap();

        let due = store.due_task_pushes(now).await.unwrap();
        assert_eq!(due.len(), 1);

        store.mark_task_push_sent(&due[0].push_id).await.unwrap();
        assert!(store.due_task_pushes(now).await.unwrap().is_empty());
    }
}

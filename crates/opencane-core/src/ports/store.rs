//! `Store` (spec §6.4, §6.3): the persistence port. Concrete schema is out
//! of scope for this workspace (spec §1); `opencane-db` provides the one
//! SQLite-backed implementation. All writes are transactional at the
//! implementation boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{DigitalTask, DigitalTaskStatus, Operation, OperationStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persisted seq/state snapshot for one `(device_id, session_id)`, the
/// `device_sessions` table (spec §6.3).
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub device_id: String,
    pub session_id: String,
    pub state: String,
    pub last_recv_seq: u64,
    pub next_outbound_seq: u64,
    pub last_seen_at: DateTime<Utc>,
}

/// A row in `lifelog_images` plus its vision context row in
/// `lifelog_contexts`, as persisted by the Vision Pipeline (spec §4.8).
#[derive(Debug, Clone)]
pub struct LifelogImageRecord {
    pub job_id: String,
    pub session_id: String,
    pub content_hash: String,
    pub dhash: u64,
    pub asset_uri: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LifelogContext {
    pub job_id: String,
    pub session_id: String,
    pub summary: String,
    pub structured: Value,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SafetyAudit {
    pub trace_id: String,
    pub session_id: Option<String>,
    pub source: String,
    pub downgraded: bool,
    pub rule_ids: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ObservabilitySample {
    pub recorded_at: DateTime<Utc>,
    pub session_count: u64,
    pub ingest_queue_depth: u64,
    pub ingest_queue_capacity: u64,
    pub push_queue_backlog: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // -- device_sessions --
    async fn upsert_session_snapshot(&self, snapshot: SessionSnapshot) -> Result<(), StoreError>;
    async fn load_session_snapshot(
        &self,
        device_id: &str,
        session_id: &str,
    ) -> Result<Option<SessionSnapshot>, StoreError>;

    // -- lifelog_events --
    async fn insert_lifelog_event(
        &self,
        session_id: &str,
        kind: &str,
        payload: Value,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn query_lifelog_timeline(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<(DateTime<Utc>, String, Value)>, StoreError>;

    // -- lifelog_images / lifelog_contexts --
    async fn insert_lifelog_image(&self, record: LifelogImageRecord) -> Result<(), StoreError>;
    /// Images within `dedup_window` of `recorded_at`, for Hamming-distance
    /// comparison by the caller (spec §4.8 step 3).
    async fn recent_lifelog_images(
        &self,
        session_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<LifelogImageRecord>, StoreError>;
    async fn insert_lifelog_context(&self, context: LifelogContext) -> Result<(), StoreError>;
    async fn lifelog_context_for_job(
        &self,
        job_id: &str,
    ) -> Result<Option<LifelogContext>, StoreError>;

    // -- digital_tasks --
    async fn insert_task(&self, task: &DigitalTask) -> Result<(), StoreError>;
    async fn update_task(&self, task: &DigitalTask) -> Result<(), StoreError>;
    async fn load_task(&self, task_id: &str) -> Result<Option<DigitalTask>, StoreError>;
    async fn list_tasks_for_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<DigitalTask>, StoreError>;
    /// Tasks not in a terminal status, for startup recovery (spec §4.9).
    async fn list_non_terminal_tasks(&self) -> Result<Vec<DigitalTask>, StoreError>;
    /// The one non-terminal task for a device, if any (spec §4.9
    /// `interrupt_previous`).
    async fn find_non_terminal_task_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<DigitalTask>, StoreError>;

    // -- digital_task_push_queue --
    /// Enqueue a `task_update` push keyed by `(device_id, task_id, status)`
    /// (spec §4.9). Re-enqueuing the same key is idempotent: the existing
    /// row's retry counters are reused rather than a duplicate row created.
    async fn enqueue_task_push(
        &self,
        device_id: &str,
        task_id: &str,
        status: DigitalTaskStatus,
        message: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn due_task_pushes(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskPush>, StoreError>;
    async fn mark_task_push_sent(&self, push_id: &str) -> Result<(), StoreError>;
    async fn reschedule_task_push(
        &self,
        push_id: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Pushes still queued for a device, replayed on its next `hello` (spec
    /// §4.9).
    async fn pending_task_pushes_for_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<TaskPush>, StoreError>;

    // -- device_operations --
    async fn enqueue_operation(&self, operation: &Operation) -> Result<(), StoreError>;
    async fn mark_operation_status(
        &self,
        operation_id: &str,
        status: OperationStatus,
    ) -> Result<(), StoreError>;
    async fn query_operations(
        &self,
        device_id: &str,
    ) -> Result<Vec<Operation>, StoreError>;

    // -- thought_traces --
    async fn insert_thought_trace(
        &self,
        session_id: &str,
        task_id: Option<&str>,
        trace: Value,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // -- safety audit (persisted as a `lifelog_events` row of kind
    //    `safety_policy`; exposed separately here for the §6.2 safety read
    //    paths) --
    async fn record_safety_audit(&self, audit: SafetyAudit) -> Result<(), StoreError>;
    async fn query_safety_audits(
        &self,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SafetyAudit>, StoreError>;

    // -- runtime_observability_samples --
    async fn insert_observability_sample(
        &self,
        sample: ObservabilitySample,
    ) -> Result<(), StoreError>;
    async fn observability_history(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ObservabilitySample>, StoreError>;
}

/// A single queued push in `digital_task_push_queue`.
#[derive(Debug, Clone)]
pub struct TaskPush {
    pub push_id: String,
    pub device_id: String,
    pub task_id: String,
    pub status: DigitalTaskStatus,
    pub message: String,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
}

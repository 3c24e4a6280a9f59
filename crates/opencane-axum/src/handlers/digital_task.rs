//! `/v1/digital-task/*` (spec §6.2): submit, inspect, cancel, list, and
//! aggregate digital tasks on top of the C9 [`opencane_runtime::TaskExecutor`].

use axum::Json;
use axum::extract::{Path, Query, State};
use opencane_core::domain::{DigitalTask, DigitalTaskStatus};
use opencane_core::ids::new_id;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::HttpError;
use crate::state::AppState;

fn task_json(task: &DigitalTask) -> Value {
    json!({
        "task_id": task.task_id,
        "session_id": task.session_id,
        "device_id": task.device_id,
        "goal": task.goal,
        "status": task.status,
        "steps": task.steps,
        "result": task.result,
        "error": task.error,
        "timeout_deadline": task.timeout_deadline,
        "notify": task.notify,
        "speak": task.speak,
        "created_at": task.created_at,
        "updated_at": task.updated_at,
    })
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    goal: String,
    session_id: String,
    device_id: String,
    timeout_seconds: Option<i64>,
    #[serde(default)]
    notify: bool,
    #[serde(default)]
    speak: bool,
    #[serde(default)]
    interrupt_previous: bool,
    task_id: Option<String>,
    /// Accepted for forward compatibility with clients that pre-plan steps;
    /// the executor derives its own step log as it runs (spec §4.9), so this
    /// is not threaded through to `TaskExecutor::submit`.
    #[serde(default)]
    #[allow(dead_code)]
    steps: Vec<String>,
}

pub async fn execute(State(ctx): State<AppState>, Json(body): Json<ExecuteRequest>) -> Result<Json<Value>, HttpError> {
    let task_id = body.task_id.unwrap_or_else(new_id);
    let task = ctx
        .task_executor
        .submit(task_id, body.session_id, body.device_id, body.goal, body.timeout_seconds, body.notify, body.speak, body.interrupt_previous)
        .await?;
    Ok(Json(task_json(&task)))
}

pub async fn get(State(ctx): State<AppState>, Path(task_id): Path<String>) -> Result<Json<Value>, HttpError> {
    let task = ctx.store.load_task(&task_id).await?.ok_or_else(|| HttpError::NotFound(format!("task not found: {task_id}")))?;
    Ok(Json(task_json(&task)))
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default = "default_cancel_reason")]
    reason: String,
}

fn default_cancel_reason() -> String {
    "canceled via control API".to_string()
}

pub async fn cancel(State(ctx): State<AppState>, Path(task_id): Path<String>, Json(body): Json<CancelRequest>) -> Result<Json<Value>, HttpError> {
    ctx.task_executor.cancel_task(&task_id, &body.reason).await?;
    Ok(Json(json!({ "success": true, "task_id": task_id })))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    device_id: Option<String>,
}

/// Lists tasks for a device when `device_id` is given; otherwise falls back
/// to every non-terminal task, since `Store` has no global "all tasks"
/// query (only per-device and non-terminal-only reads — see `DESIGN.md`).
pub async fn list(State(ctx): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Value>, HttpError> {
    let tasks = match query.device_id {
        Some(device_id) => ctx.store.list_tasks_for_device(&device_id).await?,
        None => ctx.store.list_non_terminal_tasks().await?,
    };
    let tasks: Vec<Value> = tasks.iter().map(task_json).collect();
    Ok(Json(json!({ "success": true, "tasks": tasks })))
}

pub async fn stats(State(ctx): State<AppState>) -> Result<Json<Value>, HttpError> {
    let tasks = ctx.store.list_non_terminal_tasks().await?;
    let pending = tasks.iter().filter(|t| t.status == DigitalTaskStatus::Pending).count();
    let running = tasks.iter().filter(|t| t.status == DigitalTaskStatus::Running).count();
    Ok(Json(json!({
        "success": true,
        "non_terminal": tasks.len(),
        "pending": pending,
        "running": running,
    })))
}

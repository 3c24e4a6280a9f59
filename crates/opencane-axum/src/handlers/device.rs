//! `POST /v1/device/{register,bind,activate,revoke}`, the
//! `/v1/device/ops/*` push-operation endpoints, and `POST /v1/device/event`
//! (spec §6.2).

use axum::Json;
use axum::extract::{Path, Query, State};
use opencane_bootstrap::devices::DeviceRecord;
use opencane_core::domain::{Operation, OperationStatus};
use opencane_core::envelope::Envelope;
use opencane_core::ids::new_id;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::HttpError;
use crate::state::AppState;

fn device_json(record: &DeviceRecord) -> Value {
    json!({
        "success": true,
        "device_id": record.device_id,
        "state": record.state,
        "modem_profile": record.modem_profile,
        "registered_at": record.registered_at,
        "updated_at": record.updated_at,
    })
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    device_id: String,
}

pub async fn register(State(ctx): State<AppState>, Json(body): Json<RegisterRequest>) -> Result<Json<Value>, HttpError> {
    let record = ctx.devices.register(&body.device_id)?;
    Ok(Json(device_json(&record)))
}

#[derive(Debug, Deserialize)]
pub struct BindRequest {
    device_id: String,
    modem_profile: String,
}

pub async fn bind(State(ctx): State<AppState>, Json(body): Json<BindRequest>) -> Result<Json<Value>, HttpError> {
    let record = ctx.devices.bind(&body.device_id, body.modem_profile)?;
    Ok(Json(device_json(&record)))
}

#[derive(Debug, Deserialize)]
pub struct DeviceIdRequest {
    device_id: String,
}

pub async fn activate(State(ctx): State<AppState>, Json(body): Json<DeviceIdRequest>) -> Result<Json<Value>, HttpError> {
    let record = ctx.devices.activate(&body.device_id)?;
    Ok(Json(device_json(&record)))
}

pub async fn revoke(State(ctx): State<AppState>, Json(body): Json<DeviceIdRequest>) -> Result<Json<Value>, HttpError> {
    let record = ctx.devices.revoke(&body.device_id)?;
    Ok(Json(device_json(&record)))
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    device_id: String,
    command_type: String,
    #[serde(default)]
    payload: Value,
}

/// Enqueues the operation row only (spec §6.3 `device_operations`) — no live
/// connection lookup, since `ConnectionRegistry` routes vision/task pushes
/// by `device_id` but exposes no generic "send this payload" hook beyond
/// those two sink traits. A production deployment would pair this with the
/// connection the device's transport adapter already owns.
pub async fn ops_dispatch(State(ctx): State<AppState>, Json(body): Json<DispatchRequest>) -> Result<Json<Value>, HttpError> {
    let operation = Operation::new(new_id(), body.device_id, body.command_type, body.payload);
    ctx.store.enqueue_operation(&operation).await?;
    Ok(Json(json!({ "success": true, "operation_id": operation.operation_id, "status": operation.status })))
}

pub async fn ops_ack(State(ctx): State<AppState>, Path(operation_id): Path<String>) -> Result<Json<Value>, HttpError> {
    ctx.store.mark_operation_status(&operation_id, OperationStatus::Acked).await?;
    Ok(Json(json!({ "success": true, "operation_id": operation_id })))
}

#[derive(Debug, Deserialize)]
pub struct OpsQuery {
    device_id: String,
}

pub async fn ops_query(State(ctx): State<AppState>, Query(query): Query<OpsQuery>) -> Result<Json<Value>, HttpError> {
    let operations = ctx.store.query_operations(&query.device_id).await?;
    let operations: Vec<Value> = operations
        .into_iter()
        .map(|op| {
            json!({
                "operation_id": op.operation_id,
                "device_id": op.device_id,
                "command_type": op.command_type,
                "payload": op.payload,
                "status": op.status,
                "attempts": op.attempts,
                "next_attempt_at": op.next_attempt_at,
            })
        })
        .collect();
    Ok(Json(json!({ "success": true, "operations": operations })))
}

/// Injects a canonical envelope as if it had arrived from a device, for
/// testing/replay (spec §6.2), via the dedicated `MockAdapter`-backed
/// connection `RuntimeContext::build` spawns at startup.
pub async fn event(State(ctx): State<AppState>, Json(envelope): Json<Envelope>) -> Result<Json<Value>, HttpError> {
    ctx.mock_adapter.inject(envelope).await?;
    Ok(Json(json!({ "success": true })))
}

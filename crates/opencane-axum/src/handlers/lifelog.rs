//! `/v1/lifelog/*` (spec §6.2): HTTP-side image ingestion, vector/structured
//! search, and the timeline/safety read paths.

use axum::Json;
use axum::extract::{Query, State};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use opencane_core::domain::ImageJob;
use opencane_core::ids::new_id;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnqueueImageRequest {
    device_id: String,
    session_id: String,
    image_b64: String,
    mime: String,
    question: Option<String>,
}

/// Same semantics as an `image_ready` device event, but submitted over HTTP
/// (spec §6.2) rather than an envelope — decodes straight into an
/// [`ImageJob`] and hands it to the same ingest queue the transport layer
/// feeds.
pub async fn enqueue_image(State(ctx): State<AppState>, Json(body): Json<EnqueueImageRequest>) -> Result<Json<Value>, HttpError> {
    let bytes = BASE64.decode(body.image_b64).map_err(|e| HttpError::BadRequest(format!("invalid base64 image: {e}")))?;
    let job = ImageJob::new(new_id(), body.session_id, body.device_id, bytes, body.mime, body.question, Utc::now());
    let job_id = job.job_id.clone();
    ctx.ingest.enqueue(job).await?;
    Ok(Json(json!({ "success": true, "job_id": job_id })))
}

#[derive(Debug, Deserialize)]
pub struct LifelogQueryRequest {
    query: String,
    #[serde(default)]
    filters: BTreeMap<String, String>,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

const fn default_top_k() -> usize {
    10
}

pub async fn query(State(ctx): State<AppState>, Json(body): Json<LifelogQueryRequest>) -> Result<Json<Value>, HttpError> {
    let matches = ctx.vector_index.query(&body.query, &body.filters, body.top_k).await?;
    let matches: Vec<Value> = matches
        .into_iter()
        .map(|m| json!({ "id": m.id, "text": m.text, "score": m.score, "metadata": m.metadata }))
        .collect();
    Ok(Json(json!({ "success": true, "matches": matches })))
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    session_id: String,
    #[serde(default = "default_timeline_limit")]
    limit: usize,
}

const fn default_timeline_limit() -> usize {
    100
}

pub async fn timeline(State(ctx): State<AppState>, Query(query): Query<TimelineQuery>) -> Result<Json<Value>, HttpError> {
    let events = ctx.store.query_lifelog_timeline(&query.session_id, query.limit).await?;
    let events: Vec<Value> = events
        .into_iter()
        .map(|(recorded_at, kind, payload)| json!({ "recorded_at": recorded_at, "kind": kind, "payload": payload }))
        .collect();
    Ok(Json(json!({ "success": true, "events": events })))
}

#[derive(Debug, Deserialize)]
pub struct SafetyQuery {
    session_id: Option<String>,
    #[serde(default = "default_safety_limit")]
    limit: usize,
}

const fn default_safety_limit() -> usize {
    100
}

fn audit_json(audit: &opencane_core::ports::SafetyAudit) -> Value {
    json!({
        "trace_id": audit.trace_id,
        "session_id": audit.session_id,
        "source": audit.source,
        "downgraded": audit.downgraded,
        "rule_ids": audit.rule_ids,
        "recorded_at": audit.recorded_at,
    })
}

pub async fn safety(State(ctx): State<AppState>, Query(query): Query<SafetyQuery>) -> Result<Json<Value>, HttpError> {
    let audits = ctx.store.query_safety_audits(query.session_id.as_deref(), query.limit).await?;
    let audits: Vec<Value> = audits.iter().map(audit_json).collect();
    Ok(Json(json!({ "success": true, "audits": audits })))
}

const SAFETY_STATS_SAMPLE_SIZE: usize = 1000;

pub async fn safety_stats(State(ctx): State<AppState>) -> Result<Json<Value>, HttpError> {
    let audits = ctx.store.query_safety_audits(None, SAFETY_STATS_SAMPLE_SIZE).await?;
    let downgraded = audits.iter().filter(|a| a.downgraded).count();
    Ok(Json(json!({
        "success": true,
        "total": audits.len(),
        "downgraded": downgraded,
    })))
}

//! `GET /v1/runtime/status`, `/v1/runtime/observability`, and
//! `/v1/runtime/observability/history` (spec §6.2).

use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::HttpError;
use crate::state::AppState;

pub async fn status(State(ctx): State<AppState>) -> Json<Value> {
    let ingest = ctx.ingest.metrics().await;
    Json(json!({
        "success": true,
        "adapter": "opencane",
        "session_count": ctx.session_manager.session_count().await,
        "queue": {
            "depth": ingest.depth,
            "capacity": ingest.capacity,
            "workers": ingest.workers,
            "processed": ingest.processed,
            "rejected": ingest.rejected,
            "dropped_oldest": ingest.dropped_oldest,
            "canceled": ingest.canceled,
        },
        "vector_backend_mode": "in_memory",
    }))
}

/// Threshold ratio past which a rate is flagged in `alerts` (rejected+dropped
/// over processed+rejected+dropped).
const OVERFLOW_ALERT_THRESHOLD: f64 = 0.1;

pub async fn observability(State(ctx): State<AppState>) -> Json<Value> {
    let ingest = ctx.ingest.metrics().await;
    let total = (ingest.processed + ingest.rejected + ingest.dropped_oldest).max(1);
    let overflow_rate = (ingest.rejected + ingest.dropped_oldest) as f64 / total as f64;
    let mut alerts = Vec::new();
    if overflow_rate > OVERFLOW_ALERT_THRESHOLD {
        alerts.push(format!("ingest overflow rate {overflow_rate:.2} exceeds threshold {OVERFLOW_ALERT_THRESHOLD:.2}"));
    }
    Json(json!({
        "success": true,
        "overflow_rate": overflow_rate,
        "overflow_rate_threshold": OVERFLOW_ALERT_THRESHOLD,
        "queue_depth": ingest.depth,
        "queue_capacity": ingest.capacity,
        "healthy": alerts.is_empty(),
        "alerts": alerts,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_since_hours")]
    since_hours: i64,
}

const fn default_since_hours() -> i64 {
    24
}

pub async fn observability_history(
    State(ctx): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, HttpError> {
    let since = Utc::now() - chrono::Duration::hours(query.since_hours);
    let samples = ctx.store.observability_history(since).await?;
    let points: Vec<Value> = samples
        .into_iter()
        .map(|s| {
            json!({
                "recorded_at": s.recorded_at,
                "session_count": s.session_count,
                "ingest_queue_depth": s.ingest_queue_depth,
                "ingest_queue_capacity": s.ingest_queue_capacity,
                "push_queue_backlog": s.push_queue_backlog,
            })
        })
        .collect();
    Ok(Json(json!({ "success": true, "points": points })))
}

//! Route definitions and router construction (spec §6.2). Built the way the
//! teacher's `gglib-axum::routes` builds its surface: one function
//! assembling a `Router<AppState>` from per-resource `handlers::*` modules,
//! plus a CORS layer and the optional auth middleware from [`crate::auth`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::auth;
use crate::handlers;
use crate::state::AppState;

fn v1_routes() -> Router<AppState> {
    Router::new()
        .route("/runtime/status", get(handlers::runtime::status))
        .route("/runtime/observability", get(handlers::runtime::observability))
        .route("/runtime/observability/history", get(handlers::runtime::observability_history))
        .route("/device/register", post(handlers::device::register))
        .route("/device/bind", post(handlers::device::bind))
        .route("/device/activate", post(handlers::device::activate))
        .route("/device/revoke", post(handlers::device::revoke))
        .route("/device/ops/dispatch", post(handlers::device::ops_dispatch))
        .route("/device/ops/{operation_id}/ack", post(handlers::device::ops_ack))
        .route("/device/ops", get(handlers::device::ops_query))
        .route("/device/event", post(handlers::device::event))
        .route("/device/{device_id}/ws", get(handlers::ws::upgrade))
        .route("/lifelog/enqueue_image", post(handlers::lifelog::enqueue_image))
        .route("/lifelog/query", post(handlers::lifelog::query))
        .route("/lifelog/timeline", get(handlers::lifelog::timeline))
        .route("/lifelog/safety/stats", get(handlers::lifelog::safety_stats))
        .route("/lifelog/safety", get(handlers::lifelog::safety))
        .route("/digital-task/execute", post(handlers::digital_task::execute))
        .route("/digital-task/stats", get(handlers::digital_task::stats))
        .route("/digital-task/{task_id}", get(handlers::digital_task::get))
        .route("/digital-task/{task_id}/cancel", post(handlers::digital_task::cancel))
        .route("/digital-task", get(handlers::digital_task::list))
}

/// Build the full control-surface router for `ctx` (spec §6.2): CORS on
/// everything, bearer/replay-protection middleware (both individually
/// optional, per [`crate::auth`]) applied to every `/v1` route, `/health`
/// left open the same way the teacher leaves its own `/health` open.
pub fn create_router(ctx: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let nonces: auth::NonceCache = Arc::new(Mutex::new(HashMap::new()));
    let auth_ctx = ctx.clone();
    let auth_layer = middleware::from_fn(move |req, next| {
        let ctx = auth_ctx.clone();
        let nonces = nonces.clone();
        async move { auth::check_request(ctx, nonces, req, next).await }
    });

    Router::new()
        .route("/health", get(health_check))
        .nest("/v1", v1_routes().route_layer(auth_layer))
        .layer(cors)
        .with_state(ctx)
}

pub(crate) async fn health_check() -> &'static str {
    "OK"
}

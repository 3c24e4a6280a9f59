//! `GET /v1/device/{device_id}/ws`: the transport layer's WebSocket upgrade
//! endpoint (spec §4.1's binary/JSON data-plane), accepted here and handed
//! off to `opencane_transport::WebSocketAdapter` + `RuntimeContext::spawn_connection`.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::Response;
use opencane_core::frame::DEFAULT_MAGIC;
use opencane_core::ids::new_id;
use opencane_transport::{TransportAdapter, WebSocketAdapter};

use crate::state::AppState;

pub async fn upgrade(State(ctx): State<AppState>, Path(device_id): Path<String>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        let session_id = new_id();
        let adapter: Arc<dyn TransportAdapter> = Arc::new(WebSocketAdapter::new(socket, device_id.clone(), session_id, DEFAULT_MAGIC));
        if let Err(e) = adapter.start().await {
            tracing::warn!(device_id, error = %e, "failed to start websocket adapter");
            return;
        }
        ctx.spawn_connection(device_id, adapter).await;
    })
}

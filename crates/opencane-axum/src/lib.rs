//! HTTP control surface (spec §6.2) and WebSocket upgrade endpoint (spec
//! §4.1's transport boundary) for opencane, built the way the teacher's
//! `gglib-axum` builds its surface: a shared [`AppState`], `routes.rs`
//! assembling a `Router<AppState>` from per-resource `handlers::*` modules,
//! a `CorsLayer`, and an [`error::HttpError`] implementing `IntoResponse`.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Silence unused dev-dependency warnings for test-only infrastructure.
#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use hyper as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio_test as _;
#[cfg(test)]
use tower as _;

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

pub use error::HttpError;
pub use routes::create_router;
pub use state::AppState;

/// Build the router and serve it on `ctx.config.http_listen_addr` until the
/// process is asked to shut down (spec §6.2). Mirrors the teacher's
/// `gglib-axum::bootstrap::start_server`.
pub async fn serve(ctx: Arc<opencane_bootstrap::RuntimeContext>) -> anyhow::Result<()> {
    let addr = ctx.config.http_listen_addr;
    let app = create_router(ctx);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "opencane control HTTP surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}

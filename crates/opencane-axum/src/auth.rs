//! Optional bearer-token and replay-protection middleware for the control
//! HTTP surface (spec §6.2). Grounded on the teacher's
//! `gglib-axum::embedded::validate_bearer` closure-capture pattern,
//! generalized from one mandatory check to two independently optional ones.
//! The nonce cache is owned by the closure `routes::create_router` builds,
//! not by [`crate::state::AppState`] — replay protection is this crate's
//! concern, not the composition root's.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::error::HttpError;
use crate::state::AppState;

pub type NonceCache = Arc<Mutex<HashMap<String, Instant>>>;

const NONCE_HEADER: &str = "x-request-nonce";
const TIMESTAMP_HEADER: &str = "x-request-timestamp";
const AUTH_TOKEN_HEADER: &str = "x-auth-token";

fn bearer_token_from(req: &Request) -> Option<String> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    req.headers().get(AUTH_TOKEN_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn check_bearer(ctx: &AppState, req: &Request) -> Result<(), HttpError> {
    let Some(expected) = ctx.config.http_bearer_token.as_deref() else {
        return Ok(());
    };
    match bearer_token_from(req) {
        Some(ref token) if token == expected => Ok(()),
        _ => Err(HttpError::Unauthorized),
    }
}

fn check_replay(ctx: &AppState, nonces: &NonceCache, req: &Request) -> Result<(), HttpError> {
    let Some(window) = ctx.config.http_replay_window else {
        return Ok(());
    };
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());

    let nonce = req
        .headers()
        .get(NONCE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| HttpError::BadRequest("missing X-Request-Nonce".to_string()))?
        .to_string();
    let timestamp_ms: i64 = req
        .headers()
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| HttpError::BadRequest("missing or invalid X-Request-Timestamp".to_string()))?;

    let now = Utc::now().timestamp_millis();
    let age = chrono::Duration::milliseconds((now - timestamp_ms).abs());
    if age > window {
        return Err(HttpError::BadRequest("request timestamp outside replay window".to_string()));
    }

    let std_window = window.to_std().unwrap_or_default();
    let mut guard = nonces.lock().expect("nonce cache poisoned");
    let cutoff = Instant::now().checked_sub(std_window);
    guard.retain(|_, seen_at| Some(*seen_at) >= cutoff);
    if guard.contains_key(&nonce) {
        return Err(HttpError::Conflict("nonce already used".to_string()));
    }
    guard.insert(nonce, Instant::now());
    Ok(())
}

/// Applied around every `/v1` route as `axum::middleware::from_fn`; both
/// checks are no-ops when their corresponding config field is `None` (spec
/// §6.2: both auth and replay protection are optional).
pub async fn check_request(ctx: AppState, nonces: NonceCache, req: Request, next: Next) -> Result<Response, HttpError> {
    check_bearer(&ctx, &req)?;
    check_replay(&ctx, &nonces, &req)?;
    Ok(next.run(req).await)
}

//! Integration tests for the control HTTP surface (spec §6.2): routes are
//! wired to handlers end to end over a real [`RuntimeContext`]. Grounded on
//! the teacher's `gglib-axum/tests/integration_routes.rs` shape — build a
//! router, drive it with `tower::ServiceExt::oneshot`, assert on the
//! response.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use opencane_bootstrap::RuntimeContext;
use opencane_core::settings::RuntimeConfig;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Builds a [`RuntimeContext`] backed by a fresh temp directory so each test
/// gets its own `SQLite` file, the same isolation the teacher's own
/// `bootstrap()`-per-test tests rely on.
async fn test_context() -> Arc<RuntimeContext> {
    let data_dir = tempfile::tempdir().expect("create temp data dir");
    // SAFETY: test-only process-wide env var read back immediately by
    // `RuntimeContext::build`; tests run single-threaded within this binary.
    unsafe {
        std::env::set_var("OPENCANE_DATA_DIR", data_dir.path());
    }
    let config = RuntimeConfig::default();
    let ctx = RuntimeContext::build(config).await.expect("build runtime context");
    // Keep the temp dir alive for the lifetime of the returned context by
    // leaking it — acceptable in a short-lived test process.
    std::mem::forget(data_dir);
    ctx
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("response body is valid JSON")
}

#[tokio::test]
async fn health_endpoint_returns_ok_without_auth() {
    let ctx = test_context().await;
    let app = opencane_axum::create_router(ctx);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn runtime_status_reports_session_count() {
    let ctx = test_context().await;
    let app = opencane_axum::create_router(ctx);

    let response = app
        .oneshot(Request::builder().uri("/v1/runtime/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["success"].as_bool().unwrap());
    assert_eq!(body["vector_backend_mode"], "in_memory");
}

#[tokio::test]
async fn device_lifecycle_register_bind_activate_revoke() {
    let ctx = test_context().await;
    let app = opencane_axum::create_router(ctx);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/device/register")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "device_id": "dev-001" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["state"], "registered");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/device/bind")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "device_id": "dev-001", "modem_profile": "ec600mcnle_v1" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/device/activate")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "device_id": "dev-001" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["state"], "active");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/device/revoke")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "device_id": "dev-001" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["state"], "revoked");
}

#[tokio::test]
async fn activate_before_register_is_not_found() {
    let ctx = test_context().await;
    let app = opencane_axum::create_router(ctx);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/device/activate")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "device_id": "dev-never-registered" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn digital_task_execute_then_get() {
    let ctx = test_context().await;
    let app = opencane_axum::create_router(ctx);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/digital-task/execute")
                .header("content-type", "application/json")
                .body(
                    Body::from(
                        json!({
                            "goal": "check the front door",
                            "session_id": "s1",
                            "device_id": "dev-001",
                        })
                        .to_string(),
                    ),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/digital-task/{task_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["task_id"], task_id);
    assert_eq!(body["goal"], "check the front door");
}

#[tokio::test]
async fn digital_task_get_unknown_task_is_not_found() {
    let ctx = test_context().await;
    let app = opencane_axum::create_router(ctx);

    let response = app
        .oneshot(Request::builder().uri("/v1/digital-task/does-not-exist").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bearer_auth_rejects_missing_and_wrong_token() {
    let data_dir = tempfile::tempdir().expect("create temp data dir");
    // SAFETY: test-only process-wide env var read back immediately below.
    unsafe {
        std::env::set_var("OPENCANE_DATA_DIR", data_dir.path());
    }
    let config = RuntimeConfig { http_bearer_token: Some("secret-token".to_string()), ..Default::default() };
    let ctx = RuntimeContext::build(config).await.expect("build runtime context");
    let app = opencane_axum::create_router(ctx);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/v1/runtime/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/runtime/status")
                .header("Authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/runtime/status")
                .header("Authorization", "Bearer secret-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    std::mem::forget(data_dir);
}

#[tokio::test]
async fn health_endpoint_bypasses_bearer_auth() {
    let data_dir = tempfile::tempdir().expect("create temp data dir");
    // SAFETY: test-only process-wide env var read back immediately below.
    unsafe {
        std::env::set_var("OPENCANE_DATA_DIR", data_dir.path());
    }
    let config = RuntimeConfig { http_bearer_token: Some("secret-token".to_string()), ..Default::default() };
    let ctx = RuntimeContext::build(config).await.expect("build runtime context");
    let app = opencane_axum::create_router(ctx);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    std::mem::forget(data_dir);
}

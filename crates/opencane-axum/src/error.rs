//! HTTP error type and its `{success, error_code, message}` response shape
//! (spec §6.2: "errors: `{success:false, error_code, message}`").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use opencane_bootstrap::devices::DeviceError;
use opencane_core::ports::{StoreError, VectorIndexError};
use opencane_runtime::{IngestError, TaskError};
use opencane_transport::TransportError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error_code: String,
    message: String,
}

impl HttpError {
    const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        let body = ErrorBody { success: false, error_code: error_code.to_string(), message: self.to_string() };
        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

impl From<TaskError> for HttpError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Store(store_err) => store_err.into(),
        }
    }
}

impl From<IngestError> for HttpError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::QueueFull => Self::ServiceUnavailable("ingest queue is full".to_string()),
            IngestError::Canceled => Self::ServiceUnavailable("image job canceled".to_string()),
            IngestError::Processor(msg) => Self::Internal(msg),
        }
    }
}

impl From<VectorIndexError> for HttpError {
    fn from(err: VectorIndexError) -> Self {
        match err {
            VectorIndexError::Backend(msg) => Self::Internal(msg),
        }
    }
}

impl From<DeviceError> for HttpError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::NotFound(id) => Self::NotFound(format!("device not registered: {id}")),
            DeviceError::AlreadyRegistered(id) => Self::Conflict(format!("device already registered: {id}")),
            DeviceError::IllegalTransition { from, action } => {
                Self::BadRequest(format!("illegal transition from {from:?} via {action}"))
            }
        }
    }
}

impl From<TransportError> for HttpError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Backpressure => Self::ServiceUnavailable(err.to_string()),
            TransportError::NotStarted | TransportError::AlreadyStarted => Self::Conflict(err.to_string()),
            TransportError::ConnectFailed(_) => Self::ServiceUnavailable(err.to_string()),
            TransportError::MalformedPayload(_) | TransportError::UnknownProfile(_) => Self::BadRequest(err.to_string()),
        }
    }
}

//! [`TransportError`]: the component-boundary error type for C3 (spec §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// `send_command`'s bounded internal queue was full (spec §4.3).
    #[error("transport send queue is full")]
    Backpressure,

    #[error("transport is not running")]
    NotStarted,

    #[error("transport already started")]
    AlreadyStarted,

    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("malformed inbound payload: {0}")]
    MalformedPayload(String),

    #[error("unknown modem profile: {0}")]
    UnknownProfile(String),
}

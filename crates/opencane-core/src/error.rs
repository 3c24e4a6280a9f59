//! Top-level error taxonomy (spec §7).
//!
//! Leaf crates define their own `thiserror` enums for component-local
//! failures (`VoiceError`, `TransportError`, `IngestError`, ...); `CoreError`
//! is the aggregate any of those can be converted into when they cross a
//! component boundary that callers outside the owning crate need to match on.

use thiserror::Error;

/// Errors that can cross a component boundary within the runtime core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The control or audio payload failed to parse (spec §4.1, §7).
    #[error("invalid control payload: {0}")]
    InvalidControlPayload(String),

    /// The framed audio header or payload failed to parse (spec §4.1, §7).
    #[error("invalid audio frame: {0}")]
    InvalidAudioFrame(String),

    /// The device is not authorized; the session must be closed.
    #[error("unauthorized device")]
    Unauthorized,

    /// A pluggable provider call (STT/TTS/vision/dialogue/tool) failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// A provider call exceeded its deadline.
    #[error("provider call timed out")]
    Timeout,

    /// The bounded ingest queue is at capacity and the overflow policy is `reject`.
    #[error("ingest queue is full")]
    QueueFull,

    /// A `Store` operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An unknown modem profile name was requested.
    #[error("unknown modem profile: {0}")]
    UnknownModemProfile(String),

    /// Runtime configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

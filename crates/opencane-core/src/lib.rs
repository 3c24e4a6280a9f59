//! Domain types, the canonical envelope/frame codec, and port traits shared
//! by every OpenCane crate.
//!
//! This crate has no infrastructure dependencies (no sqlx, no axum, no MQTT
//! client) — it is the hexagonal core that adapters in the other crates are
//! written against.

#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod ids;
pub mod modem;
pub mod paths;
pub mod ports;
pub mod settings;

pub use domain::{AudioSegment, DigitalTask, DigitalTaskStatus, ImageJob, ImageJobStatus, Operation, OperationStatus, Session, SessionState};
pub use envelope::{Envelope, EnvelopePayload};
pub use error::CoreError;
pub use frame::{FrameError, FrameHeader};
pub use modem::ModemProfile;
pub use settings::RuntimeConfig;

#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tempfile as _;

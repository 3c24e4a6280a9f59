//! Transport Adapters (C3, spec §4.3): the capability set polymorphic over
//! `Mock`, `WebSocket`, `GenericMQTT`, `EC600MQTT`.

pub mod mock;
pub mod mqtt;
pub mod websocket;

use async_trait::async_trait;
use opencane_core::envelope::Envelope;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// One device connection's transport, abstracted over its physical carrier.
///
/// `incoming_events` hands out its receiver once — spec §4.3 describes the
/// inbound stream as "a lazy sequence of Envelope, infinite, not
/// restartable" — a second call returns `None`.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    async fn start(&self) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;

    /// Takes ownership of the inbound event channel. Returns `None` if
    /// already taken.
    fn incoming_events(&self) -> Option<mpsc::Receiver<Envelope>>;

    /// Non-blocking; fails with [`TransportError::Backpressure`] when the
    /// adapter's internal output queue is full (spec §4.3).
    async fn send_command(&self, envelope: Envelope) -> Result<(), TransportError>;

    async fn ack(&self, session_id: &str, seq: u64) -> Result<(), TransportError>;

    async fn close_session(&self, session_id: &str) -> Result<(), TransportError>;
}

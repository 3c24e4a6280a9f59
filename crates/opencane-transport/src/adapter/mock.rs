//! `MockAdapter`: in-process transport for tests and the
//! `POST /v1/device/event` injection endpoint (spec §4.3).

use std::sync::Mutex;

use async_trait::async_trait;
use opencane_core::envelope::Envelope;
use tokio::sync::mpsc;

use super::TransportAdapter;
use crate::error::TransportError;

const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// An in-process adapter whose inbound side is fed directly by a test
/// harness (or the HTTP injection endpoint) via [`MockAdapter::inject`],
/// and whose outbound side is drained via [`MockAdapter::take_sent`].
pub struct MockAdapter {
    started: Mutex<bool>,
    inbound_tx: mpsc::Sender<Envelope>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    outbound_tx: mpsc::Sender<Envelope>,
    outbound_rx: Mutex<mpsc::Receiver<Envelope>>,
}

impl MockAdapter {
    #[must_use]
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        Self {
            started: Mutex::new(false),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    /// Feed an envelope into the adapter's inbound stream, as if it arrived
    /// from a device.
    pub async fn inject(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.inbound_tx
            .try_send(envelope)
            .map_err(|_| TransportError::Backpressure)
    }

    /// Drain one envelope sent via [`TransportAdapter::send_command`], for
    /// test assertions.
    pub async fn take_sent(&self) -> Option<Envelope> {
        self.outbound_rx.lock().expect("outbound_rx mutex poisoned").recv().await
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportAdapter for MockAdapter {
    async fn start(&self) -> Result<(), TransportError> {
        let mut started = self.started.lock().expect("started mutex poisoned");
        if *started {
            return Err(TransportError::AlreadyStarted);
        }
        *started = true;
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let mut started = self.started.lock().expect("started mutex poisoned");
        if !*started {
            return Err(TransportError::NotStarted);
        }
        *started = false;
        Ok(())
    }

    fn incoming_events(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.inbound_rx.lock().expect("inbound_rx mutex poisoned").take()
    }

    async fn send_command(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.outbound_tx.try_send(envelope).map_err(|_| TransportError::Backpressure)
    }

    async fn ack(&self, _session_id: &str, _seq: u64) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close_session(&self, _session_id: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use opencane_core::envelope::{AckPayload, EnvelopePayload};

    use super::*;

    fn ack_envelope(seq: u64) -> Envelope {
        Envelope {
            version: "0.1".to_string(),
            msg_id: "m1".to_string(),
            device_id: "dev-1".to_string(),
            session_id: Some("sess-1".to_string()),
            seq: Some(seq),
            ts: 0,
            payload: EnvelopePayload::Ack(AckPayload { ack_seq: seq }),
        }
    }

    #[tokio::test]
    async fn incoming_events_can_only_be_taken_once() {
        let adapter = MockAdapter::new();
        assert!(adapter.incoming_events().is_some());
        assert!(adapter.incoming_events().is_none());
    }

    #[tokio::test]
    async fn injected_envelope_is_observable_on_incoming_events() {
        let adapter = MockAdapter::new();
        let mut rx = adapter.incoming_events().expect("not yet taken");
        adapter.inject(ack_envelope(1)).await.expect("inject");
        let received = rx.recv().await.expect("channel open");
        assert_eq!(received.seq, Some(1));
    }

    #[tokio::test]
    async fn sent_command_is_observable_via_take_sent() {
        let adapter = MockAdapter::new();
        adapter.send_command(ack_envelope(7)).await.expect("send");
        let sent = adapter.take_sent().await.expect("one command sent");
        assert_eq!(sent.seq, Some(7));
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let adapter = MockAdapter::new();
        adapter.start().await.expect("first start");
        assert!(matches!(adapter.start().await, Err(TransportError::AlreadyStarted)));
    }
}

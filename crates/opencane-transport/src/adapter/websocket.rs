//! `WebSocketAdapter`: the binary audio data-plane / JSON control-plane
//! transport over a single `axum` WebSocket connection.
//!
//! Grounded on the teacher's `gglib-axum::handlers::voice_ws` ingest/egress
//! split — two tasks own opposite halves of the split socket, raced with
//! `tokio::select!` so either a graceful close or a network drop on either
//! side tears down the whole connection.

use std::sync::Mutex;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use opencane_core::envelope::{AudioChunkPayload, Envelope, EnvelopePayload, ErrorPayload};
use opencane_core::frame::FrameHeader;
use opencane_core::ids::new_id;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::TransportAdapter;
use crate::error::TransportError;

const QUEUE_CAPACITY: usize = 128;

struct RunningTasks {
    ingest: JoinHandle<()>,
    egress: JoinHandle<()>,
}

/// One device's WebSocket connection. Constructed by the HTTP layer once a
/// connection has been accepted; a new connection (e.g. after a reconnect)
/// gets a new `WebSocketAdapter`.
pub struct WebSocketAdapter {
    device_id: String,
    session_id: String,
    magic_byte: u8,
    socket: Mutex<Option<WebSocket>>,
    inbound_tx: mpsc::Sender<Envelope>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    outbound_tx: mpsc::Sender<Envelope>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    tasks: Mutex<Option<RunningTasks>>,
}

impl WebSocketAdapter {
    #[must_use]
    pub fn new(socket: WebSocket, device_id: String, session_id: String, magic_byte: u8) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            device_id,
            session_id,
            magic_byte,
            socket: Mutex::new(Some(socket)),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            tasks: Mutex::new(None),
        }
    }

    fn decode_binary_frame(data: &[u8], magic: u8, device_id: &str, session_id: &str) -> Result<Envelope, TransportError> {
        let header = FrameHeader::decode(data, magic).map_err(|e| TransportError::MalformedPayload(e.to_string()))?;
        let payload = &data[header.payload_range()];
        Ok(Envelope {
            version: "0.1".to_string(),
            msg_id: new_id(),
            device_id: device_id.to_string(),
            session_id: Some(session_id.to_string()),
            seq: Some(u64::from(header.seq)),
            ts: i64::from(header.timestamp_ms),
            payload: EnvelopePayload::AudioChunk(AudioChunkPayload {
                audio_b64: BASE64.encode(payload),
            }),
        })
    }

    fn malformed_envelope(device_id: &str, session_id: &str, message: String) -> Envelope {
        Envelope {
            version: "0.1".to_string(),
            msg_id: new_id(),
            device_id: device_id.to_string(),
            session_id: Some(session_id.to_string()),
            seq: None,
            ts: 0,
            payload: EnvelopePayload::Error(ErrorPayload {
                code: "malformed_payload".to_string(),
                message,
            }),
        }
    }
}

#[async_trait]
impl TransportAdapter for WebSocketAdapter {
    async fn start(&self) -> Result<(), TransportError> {
        let socket = self
            .socket
            .lock()
            .expect("socket mutex poisoned")
            .take()
            .ok_or(TransportError::AlreadyStarted)?;

        let (mut ws_sender, mut ws_receiver) = socket.split();

        let inbound_tx = self.inbound_tx.clone();
        let magic = self.magic_byte;
        let device_id = self.device_id.clone();
        let session_id = self.session_id.clone();

        let ingest = tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let envelope = match Self::decode_binary_frame(&data, magic, &device_id, &session_id) {
                            Ok(envelope) => envelope,
                            Err(e) => Self::malformed_envelope(&device_id, &session_id, e.to_string()),
                        };
                        if inbound_tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Text(text)) => {
                        let envelope = match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => envelope,
                            Err(e) => Self::malformed_envelope(&device_id, &session_id, e.to_string()),
                        };
                        if inbound_tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        let outbound_rx = self
            .outbound_rx
            .lock()
            .expect("outbound_rx mutex poisoned")
            .take()
            .ok_or(TransportError::AlreadyStarted)?;

        let egress = tokio::spawn(async move {
            let mut outbound_rx = outbound_rx;
            while let Some(envelope) = outbound_rx.recv().await {
                let wire = match serde_json::to_string(&envelope) {
                    Ok(wire) => wire,
                    Err(_) => continue,
                };
                if ws_sender.send(Message::Text(wire)).await.is_err() {
                    break;
                }
            }
        });

        *self.tasks.lock().expect("tasks mutex poisoned") = Some(RunningTasks { ingest, egress });
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let tasks = self.tasks.lock().expect("tasks mutex poisoned").take().ok_or(TransportError::NotStarted)?;
        tasks.ingest.abort();
        tasks.egress.abort();
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
        self.stop().await
    }
}

#[cfg(test)]
mod tests {
    use opencane_core::frame::{DEFAULT_MAGIC, DEFAULT_VERSION};

    use super::*;

    fn encode_frame(seq: u32, ts: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 16];
        buf[0] = DEFAULT_MAGIC;
        buf[1] = DEFAULT_VERSION;
        buf[4..8].copy_from_slice(&seq.to_be_bytes());
        buf[8..12].copy_from_slice(&ts.to_be_bytes());
        buf[12..16].copy_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn decodes_binary_frame_into_audio_chunk_envelope() {
        let frame = encode_frame(42, 1_000, b"pcm-bytes");
        let envelope =
            WebSocketAdapter::decode_binary_frame(&frame, DEFAULT_MAGIC, "dev-1", "sess-1").expect("valid frame");
        assert_eq!(envelope.seq, Some(42));
        assert_eq!(envelope.ts, 1_000);
        match envelope.payload {
            EnvelopePayload::AudioChunk(chunk) => {
                assert_eq!(BASE64.decode(chunk.audio_b64).unwrap(), b"pcm-bytes");
            }
            other => panic!("expected AudioChunk, got {other:?}"),
        }
    }

    #[test]
    fn magic_mismatch_is_a_malformed_payload_error() {
        let frame = encode_frame(1, 0, b"x");
        let result = WebSocketAdapter::decode_binary_frame(&frame, 0xFF, "dev-1", "sess-1");
        assert!(result.is_err());
    }
}

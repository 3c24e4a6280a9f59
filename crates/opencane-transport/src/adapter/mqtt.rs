//! `GenericMqttAdapter` / `EC600MqttAdapter`: MQTT transport over a modem
//! profile's topic set (spec §4.3, §6.1).
//!
//! No direct teacher analog — `rumqttc` is new to this workspace, pulled in
//! the way `other_examples`' network-agent crates use it for a
//! publish/subscribe device transport. Reconnect uses
//! [`crate::backoff::FullJitterBackoff`] within the profile's
//! `[reconnect_min, reconnect_max]`.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use opencane_core::envelope::{Envelope, EnvelopePayload};
use opencane_core::frame::FrameHeader;
use opencane_core::modem::{AudioMode, ModemProfile, Qos};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::TransportAdapter;
use crate::backoff::FullJitterBackoff;
use crate::error::TransportError;

const QUEUE_CAPACITY: usize = 128;

fn to_rumqttc_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyTwo,
    }
}

/// MQTT transport for any registered modem profile (spec §4.3 `GenericMQTT`).
pub struct GenericMqttAdapter {
    profile: ModemProfile,
    device_id: String,
    broker_host: String,
    broker_port: u16,
    inbound_tx: mpsc::Sender<Envelope>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    outbound_tx: mpsc::Sender<Envelope>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl GenericMqttAdapter {
    #[must_use]
    pub fn new(profile: ModemProfile, device_id: String, broker_host: String, broker_port: u16) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            profile,
            device_id,
            broker_host,
            broker_port,
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            tasks: Mutex::new(None),
        }
    }

    fn client_id(&self) -> String {
        format!("opencane-{}", self.device_id)
    }

    fn decode_incoming(topic: &str, payload: &[u8], profile: &ModemProfile, device_id: &str) -> Option<Envelope> {
        let is_audio_topic = topic == ModemProfile::render_topic(&profile.inbound_audio_topic, device_id);
        if is_audio_topic && profile.audio_mode == AudioMode::FramedPacket {
            let header = FrameHeader::decode(payload, profile.magic_byte).ok()?;
            let bytes = &payload[header.payload_range()];
            return Some(Envelope {
                version: "0.1".to_string(),
                msg_id: opencane_core::ids::new_id(),
                device_id: device_id.to_string(),
                session_id: None,
                seq: Some(u64::from(header.seq)),
                ts: i64::from(header.timestamp_ms),
                payload: EnvelopePayload::AudioChunk(opencane_core::envelope::AudioChunkPayload {
                    audio_b64: BASE64.encode(bytes),
                }),
            });
        }
        serde_json::from_slice::<Envelope>(payload).ok()
    }
}

#[async_trait]
impl TransportAdapter for GenericMqttAdapter {
    async fn start(&self) -> Result<(), TransportError> {
        if self.tasks.lock().expect("tasks mutex poisoned").is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let mut options = MqttOptions::new(self.client_id(), self.broker_host.clone(), self.broker_port);
        options.set_keep_alive(Duration::from_secs(u64::from(self.profile.keepalive_seconds)));
        let (client, mut eventloop) = AsyncClient::new(options, QUEUE_CAPACITY);

        let inbound_control = ModemProfile::render_topic(&self.profile.inbound_control_topic, &self.device_id);
        let inbound_audio = ModemProfile::render_topic(&self.profile.inbound_audio_topic, &self.device_id);
        client
            .subscribe(inbound_control.as_str(), to_rumqttc_qos(self.profile.control_qos))
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        client
            .subscribe(inbound_audio.as_str(), to_rumqttc_qos(self.profile.audio_qos))
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let profile = self.profile.clone();
        let device_id = self.device_id.clone();
        let inbound_tx = self.inbound_tx.clone();
        let reconnect_min = Duration::from_millis(profile.reconnect_min_ms);
        let reconnect_max = Duration::from_millis(profile.reconnect_max_ms);

        let ingest = tokio::spawn(async move {
            let mut backoff = FullJitterBackoff::new(reconnect_min, reconnect_max);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        backoff.reset();
                        if let Some(envelope) =
                            Self::decode_incoming(&publish.topic, &publish.payload, &profile, &device_id)
                        {
                            if inbound_tx.send(envelope).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(_) => {
                        backoff.reset();
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, device_id = %device_id, "mqtt connection error, reconnecting");
                        tokio::time::sleep(backoff.next_delay()).await;
                    }
                }
            }
        });

        let outbound_control = ModemProfile::render_topic(&self.profile.outbound_control_topic, &self.device_id);
        let outbound_audio = ModemProfile::render_topic(&self.profile.outbound_audio_topic, &self.device_id);
        let control_qos = to_rumqttc_qos(self.profile.control_qos);
        let audio_qos = to_rumqttc_qos(self.profile.audio_qos);
        let outbound_rx = self
            .outbound_rx
            .lock()
            .expect("outbound_rx mutex poisoned")
            .take()
            .ok_or(TransportError::AlreadyStarted)?;

        let egress = tokio::spawn(async move {
            let mut outbound_rx = outbound_rx;
            while let Some(envelope) = outbound_rx.recv().await {
                let is_audio = matches!(
                    envelope.payload,
                    EnvelopePayload::AudioChunk(_) | EnvelopePayload::TtsChunk(_)
                );
                let Ok(payload) = serde_json::to_vec(&envelope) else {
                    continue;
                };
                let (topic, qos) = if is_audio {
                    (&outbound_audio, audio_qos)
                } else {
                    (&outbound_control, control_qos)
                };
                if client.publish(topic.as_str(), qos, false, payload).await.is_err() {
                    break;
                }
            }
        });

        *self.tasks.lock().expect("tasks mutex poisoned") = Some((ingest, egress));
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let (ingest, egress) = self.tasks.lock().expect("tasks mutex poisoned").take().ok_or(TransportError::NotStarted)?;
        ingest.abort();
        egress.abort();
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

/// The legacy `EC600MQTT` modem dialect (spec §4.3): a `GenericMqttAdapter`
/// pinned to the `ec600mcnle_v1` profile — the only behavioral difference
/// spec.md names for this variant is its fixed profile, not a distinct wire
/// mechanism.
pub struct EC600MqttAdapter {
    inner: GenericMqttAdapter,
}

impl EC600MqttAdapter {
    #[must_use]
    pub fn new(profile: ModemProfile, device_id: String, broker_host: String, broker_port: u16) -> Self {
        Self {
            inner: GenericMqttAdapter::new(profile, device_id, broker_host, broker_port),
        }
    }
}

#[async_trait]
impl TransportAdapter for EC600MqttAdapter {
    async fn start(&self) -> Result<(), TransportError> {
        self.inner.start().await
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.inner.stop().await
    }

    fn incoming_events(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.inner.incoming_events()
    }

    async fn send_command(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.inner.send_command(envelope).await
    }

    async fn ack(&self, session_id: &str, seq: u64) -> Result<(), TransportError> {
        self.inner.ack(session_id, seq).await
    }

    async fn close_session(&self, session_id: &str) -> Result<(), TransportError> {
        self.inner.close_session(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::lookup;

    #[test]
    fn decode_incoming_parses_json_control_message() {
        let profile = lookup("ec600mcnle_v1", None).expect("known profile");
        let envelope = Envelope {
            version: "0.1".to_string(),
            msg_id: "m1".to_string(),
            device_id: "dev-1".to_string(),
            session_id: None,
            seq: None,
            ts: 0,
            payload: EnvelopePayload::Heartbeat(opencane_core::envelope::HeartbeatPayload::default()),
        };
        let topic = ModemProfile::render_topic(&profile.inbound_control_topic, "dev-1");
        let payload = serde_json::to_vec(&envelope).unwrap();
        let decoded = GenericMqttAdapter::decode_incoming(&topic, &payload, &profile, "dev-1");
        assert!(decoded.is_some());
    }
}

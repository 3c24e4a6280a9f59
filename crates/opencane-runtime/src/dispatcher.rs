//! Connection Runtime (C6, spec §4.6): the central dispatcher — resolve
//! session, check/commit seq, route by `type`, drive the per-session voice
//! pipeline and the state machine in the spec's transition table.
//!
//! One dispatch loop drains `TransportAdapter::incoming_events()` and
//! processes envelopes in arrival order; each envelope's handling awaits
//! out to the `DialogueEngine`/TTS backend/store, the same shape as the
//! teacher's single-loop command dispatch in `process::manager`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use opencane_agent::safety::{
    apply_safety_rules, RecentP0Hint, ResponseSource, SafetyContext, SafetyRule,
};
use opencane_core::domain::{DigitalTaskStatus, ImageJob, SessionState};
use opencane_core::envelope::{
    AckPayload, Envelope, EnvelopePayload, HelloAckPayload, TaskUpdatePayload, TtsChunkPayload,
    TtsStartPayload, TtsStopPayload,
};
use opencane_core::ids::new_id;
use opencane_core::ports::{DialogueEngine, RiskLevel, SafetyAudit as StoreSafetyAudit, Store};
use opencane_core::settings::RuntimeConfig;
use opencane_transport::adapter::TransportAdapter;
use opencane_voice::{SttBackend, TtsBackend, VoiceEvent, VoicePipeline, VoicePipelineConfig};
use tokio::sync::{Mutex as TokioMutex, RwLock};

use crate::ingest::IngestQueue;
use crate::session::SessionManager;
use crate::task::{TaskExecutor, TaskPushSink};
use crate::vision::VisionReplySink;

type SessionKey = (String, String);

pub struct ConnectionRuntime {
    session_manager: Arc<SessionManager>,
    adapter: Arc<dyn TransportAdapter>,
    dialogue: Arc<dyn DialogueEngine>,
    stt_backend: Arc<dyn SttBackend>,
    tts_backend: Arc<dyn TtsBackend>,
    voice_pipelines: RwLock<HashMap<SessionKey, Arc<TokioMutex<VoicePipeline>>>>,
    /// Per-session buffer of [`VoiceEvent`]s collected between a `speak()`
    /// call and [`Self::drain_voice_events`] forwarding them as envelopes —
    /// `Arc`-wrapped on its own so the collector task spawned per session
    /// doesn't need to hold the whole runtime alive.
    voice_event_queues: Arc<RwLock<HashMap<SessionKey, Vec<VoiceEvent>>>>,
    ingest: Arc<IngestQueue>,
    task_executor: Arc<TaskExecutor>,
    store: Arc<dyn Store>,
    safety_rules: Vec<Box<dyn SafetyRule>>,
    recent_p0: RwLock<HashMap<String, RecentP0Hint>>,
    config: RuntimeConfig,
}

impl ConnectionRuntime {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_manager: Arc<SessionManager>,
        adapter: Arc<dyn TransportAdapter>,
        dialogue: Arc<dyn DialogueEngine>,
        stt_backend: Arc<dyn SttBackend>,
        tts_backend: Arc<dyn TtsBackend>,
        ingest: Arc<IngestQueue>,
        task_executor: Arc<TaskExecutor>,
        store: Arc<dyn Store>,
        safety_rules: Vec<Box<dyn SafetyRule>>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            session_manager,
            adapter,
            dialogue,
            stt_backend,
            tts_backend,
            voice_pipelines: RwLock::new(HashMap::new()),
            voice_event_queues: Arc::new(RwLock::new(HashMap::new())),
            ingest,
            task_executor,
            store,
            safety_rules,
            recent_p0: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Drains the adapter's inbound stream until it closes (spec §4.3: "a
    /// lazy sequence of Envelope, infinite, not restartable").
    pub async fn run(self: Arc<Self>) {
        let Some(mut events) = self.adapter.incoming_events() else {
            tracing::error!("incoming_events already taken; connection runtime cannot start");
            return;
        };
        while let Some(envelope) = events.recv().await {
            if let Err(e) = self.dispatch(envelope).await {
                tracing::error!(error = %e, "envelope dispatch failed");
            }
        }
    }

    async fn dispatch(&self, envelope: Envelope) -> Result<(), opencane_transport::error::TransportError> {
        let device_id = envelope.device_id.clone();
        let session = self
            .session_manager
            .get_or_create(&device_id, envelope.session_id.as_deref())
            .await;

        if let Some(seq) = envelope.seq {
            let decision = self
                .session_manager
                .check_and_commit_seq(&session, seq)
                .await
                .map_err(|e| opencane_transport::error::TransportError::ConnectFailed(e.to_string()))?;
            if decision == crate::session::SeqDecision::Duplicate {
                self.reemit_ack(&session, &envelope).await?;
                return Ok(());
            }
        }

        match &envelope.payload {
            EnvelopePayload::Hello(payload) => self.handle_hello(&session, payload.clone()).await?,
            EnvelopePayload::Heartbeat(payload) => self.handle_heartbeat(&session, payload.clone()).await?,
            EnvelopePayload::ListenStart(_) => self.handle_listen_start(&session).await,
            EnvelopePayload::AudioChunk(payload) => self.handle_audio_chunk(&session, envelope.seq.unwrap_or(0), payload.clone()).await,
            EnvelopePayload::ListenStop(payload) => self.handle_listen_stop(&session, &device_id, payload.transcript.clone()).await?,
            EnvelopePayload::Abort(payload) => self.handle_abort(&session, payload.cancel_task).await,
            EnvelopePayload::ImageReady(payload) => self.handle_image_ready(&session, &device_id, payload.clone()).await?,
            EnvelopePayload::Telemetry(payload) => {
                self.session_manager.update_telemetry(&session, payload.kv.clone()).await;
            }
            EnvelopePayload::ToolResult(_) | EnvelopePayload::Error(_) | EnvelopePayload::Unknown(..) => {
                tracing::debug!(msg_id = %envelope.msg_id, type_name = %envelope.type_name(), "no dispatcher action for this event type");
            }
            // Command-direction payloads never arrive as inbound events.
            _ => {}
        }

        Ok(())
    }

    /// Re-emit the command already owed for an ack-able duplicate, never
    /// silently dropping it (spec §4.6 step 2).
    async fn reemit_ack(&self, session: &Arc<TokioMutex<opencane_core::domain::Session>>, envelope: &Envelope) -> Result<(), opencane_transport::error::TransportError> {
        if matches!(envelope.payload, EnvelopePayload::Hello(_)) {
            self.send_command(session, &envelope.device_id, EnvelopePayload::HelloAck(HelloAckPayload { server_time_ms: Some(Utc::now().timestamp_millis()) })).await?;
        } else if envelope.payload.is_ackable_event() {
            self.send_command(session, &envelope.device_id, EnvelopePayload::Ack(AckPayload { ack_seq: envelope.seq.unwrap_or(0) })).await?;
        }
        Ok(())
    }

    /// Allocates the next outbound seq, records it in the replay window,
    /// and hands it to the transport adapter — buffering into
    /// `pending_commands` on backpressure instead of dropping it (spec §4.6
    /// offline buffering).
    async fn send_command(
        &self,
        session: &Arc<TokioMutex<opencane_core::domain::Session>>,
        device_id: &str,
        payload: EnvelopePayload,
    ) -> Result<(), opencane_transport::error::TransportError> {
        let seq = self
            .session_manager
            .next_outbound_seq(session)
            .await
            .map_err(|e| opencane_transport::error::TransportError::ConnectFailed(e.to_string()))?;
        let session_id = session.lock().await.session_id.clone();
        let envelope = Envelope {
            version: "0.1".to_string(),
            msg_id: new_id(),
            device_id: device_id.to_string(),
            session_id: Some(session_id),
            seq: Some(seq),
            ts: Utc::now().timestamp_millis(),
            payload,
        };
        self.session_manager.record_command(session, seq, envelope.clone()).await;

        match self.adapter.send_command(envelope.clone()).await {
            Ok(()) => Ok(()),
            Err(opencane_transport::error::TransportError::Backpressure) => {
                session.lock().await.push_pending(envelope);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_hello(&self, session: &Arc<TokioMutex<opencane_core::domain::Session>>, payload: opencane_core::envelope::HelloPayload) -> Result<(), opencane_transport::error::TransportError> {
        let (device_id, replay, pending) = {
            let mut guard = session.lock().await;
            guard.state = SessionState::Ready;
            let replay = guard.replay_after(payload.last_recv_seq.unwrap_or(0));
            let pending = guard.drain_pending();
            (guard.device_id.clone(), replay, pending)
        };

        for envelope in replay.into_iter().chain(pending) {
            if let Err(e) = self.adapter.send_command(envelope).await {
                tracing::warn!(error = %e, "failed to replay/flush command on hello");
            }
        }

        self.send_command(session, &device_id, EnvelopePayload::HelloAck(HelloAckPayload { server_time_ms: Some(Utc::now().timestamp_millis()) })).await
    }

    async fn handle_heartbeat(&self, session: &Arc<TokioMutex<opencane_core::domain::Session>>, payload: opencane_core::envelope::HeartbeatPayload) -> Result<(), opencane_transport::error::TransportError> {
        self.session_manager.update_telemetry(session, payload.telemetry).await;
        let (device_id, last_recv_seq) = {
            let guard = session.lock().await;
            (guard.device_id.clone(), guard.last_recv_seq)
        };
        self.send_command(session, &device_id, EnvelopePayload::Ack(AckPayload { ack_seq: last_recv_seq })).await
    }

    async fn handle_listen_start(&self, session: &Arc<TokioMutex<opencane_core::domain::Session>>) {
        let key = self.session_key(session).await;
        let was_speaking = {
            let mut guard = session.lock().await;
            let was_speaking = guard.state == SessionState::Speaking;
            guard.state = SessionState::Listening;
            was_speaking
        };

        if was_speaking {
            if let Some(pipeline) = self.voice_pipelines.read().await.get(&key) {
                pipeline.lock().await.stop_speaking();
            }
            let (device_id, _) = key.clone();
            let _ = self.send_command(session, &device_id, EnvelopePayload::TtsStop(TtsStopPayload { aborted: true })).await;
        }

        let pipeline = self.pipeline_for(&key).await;
        pipeline.lock().await.open_segment();
    }

    async fn handle_audio_chunk(&self, session: &Arc<TokioMutex<opencane_core::domain::Session>>, seq: u64, payload: opencane_core::envelope::AudioChunkPayload) {
        let key = self.session_key(session).await;
        let pipeline = self.pipeline_for(&key).await;
        let Ok(bytes) = BASE64.decode(payload.audio_b64.as_bytes()) else {
            tracing::warn!("failed to decode audio_chunk base64 payload");
            return;
        };
        let samples = pcm16le_to_f32(&bytes);
        pipeline.lock().await.push_audio_chunk(seq, samples);
    }

    async fn handle_listen_stop(
        &self,
        session: &Arc<TokioMutex<opencane_core::domain::Session>>,
        device_id: &str,
        device_transcript: Option<String>,
    ) -> Result<(), opencane_transport::error::TransportError> {
        let key = self.session_key(session).await;
        session.lock().await.state = SessionState::Thinking;

        let pipeline = self.pipeline_for(&key).await;
        let transcript = pipeline.lock().await.finalize(device_transcript).await;

        let reply = if transcript.is_empty() {
            None
        } else {
            match self.dialogue.reply(&serde_json::json!({}), &transcript).await {
                Ok(reply) => Some(reply),
                Err(e) => {
                    tracing::warn!(error = %e, "dialogue engine call failed");
                    None
                }
            }
        };

        let Some(reply) = reply else {
            session.lock().await.state = SessionState::Ready;
            return Ok(());
        };

        if let Some(trace) = reply.thought_trace.clone() {
            let session_id = session.lock().await.session_id.clone();
            let _ = self.store.insert_thought_trace(&session_id, None, trace, Utc::now()).await;
        }

        self.speak_reply(session, device_id, &key, reply.text, ResponseSource::DialogueEngine, 1.0).await
    }

    /// Runs the safety gate over a candidate spoken response, then speaks it
    /// through the session's voice pipeline (spec §4.6 `THINKING -> SPEAKING`).
    /// Shared by dialogue replies and vision/task-result replies, each with
    /// their own [`ResponseSource`].
    pub async fn speak_reply(
        &self,
        session: &Arc<TokioMutex<opencane_core::domain::Session>>,
        device_id: &str,
        key: &SessionKey,
        text: String,
        source: ResponseSource,
        confidence: f32,
    ) -> Result<(), opencane_transport::error::TransportError> {
        let session_id = key.1.clone();
        let recent_p0_hint = self.recent_p0.read().await.get(&session_id).cloned();

        let ctx = SafetyContext {
            source,
            confidence,
            now: Utc::now(),
            recent_p0_hint,
            max_response_chars: self.config.safety_text_length_cap,
        };
        let trace_id = new_id();
        let (result, audit) = apply_safety_rules(&text, &ctx, &self.safety_rules, trace_id.clone());

        let _ = self
            .store
            .record_safety_audit(StoreSafetyAudit {
                trace_id,
                session_id: Some(session_id.clone()),
                source: format!("{source:?}"),
                downgraded: audit.downgraded,
                rule_ids: audit.rule_ids.iter().map(|id| (*id).to_string()).collect(),
                recorded_at: Utc::now(),
            })
            .await;

        session.lock().await.state = SessionState::Speaking;
        self.send_command(session, device_id, EnvelopePayload::TtsStart(TtsStartPayload { turn_id: None })).await?;

        let pipeline = self.pipeline_for(key).await;
        if let Err(e) = pipeline.lock().await.speak(&result.text).await {
            tracing::warn!(error = %e, "tts synthesis failed for reply");
        }
        self.drain_voice_events(session, device_id, key).await?;

        self.send_command(session, device_id, EnvelopePayload::TtsStop(TtsStopPayload { aborted: false })).await?;
        session.lock().await.state = SessionState::Ready;
        Ok(())
    }

    /// Drains whatever the pipeline emitted during the last `speak()` call
    /// and forwards audio as chunked `tts_chunk` commands (spec §4.6 default
    /// 4096 bytes per chunk).
    async fn drain_voice_events(&self, session: &Arc<TokioMutex<opencane_core::domain::Session>>, device_id: &str, key: &SessionKey) -> Result<(), opencane_transport::error::TransportError> {
        let events = {
            let mut guard = self.voice_event_queues.write().await;
            guard.remove(key).unwrap_or_default()
        };
        for event in events {
            if let VoiceEvent::TtsAudioChunk { samples, .. } = event {
                let bytes = f32_to_pcm16le(&samples);
                for chunk in bytes.chunks(self.config.tts_audio_chunk_bytes.max(1)) {
                    self.send_command(session, device_id, EnvelopePayload::TtsChunk(TtsChunkPayload { text: None, audio_b64: Some(BASE64.encode(chunk)) })).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_abort(&self, session: &Arc<TokioMutex<opencane_core::domain::Session>>, cancel_task: bool) {
        let (key, task_id) = {
            let mut guard = session.lock().await;
            guard.state = SessionState::Ready;
            (self.key_from_session(&guard), guard.active_task_id.take())
        };
        if let Some(pipeline) = self.voice_pipelines.read().await.get(&key) {
            pipeline.lock().await.stop_speaking();
        }
        self.ingest.cancel_session(&key.1).await;
        if cancel_task {
            if let Some(task_id) = task_id {
                if let Err(e) = self.task_executor.cancel_task(&task_id, "aborted by device").await {
                    tracing::warn!(error = %e, "failed to cancel task on abort");
                }
            }
        }
    }

    async fn handle_image_ready(&self, session: &Arc<TokioMutex<opencane_core::domain::Session>>, device_id: &str, payload: opencane_core::envelope::ImageReadyPayload) -> Result<(), opencane_transport::error::TransportError> {
        let Ok(bytes) = BASE64.decode(payload.image_b64.as_bytes()) else {
            tracing::warn!("failed to decode image_ready base64 payload");
            return Ok(());
        };
        let session_id = session.lock().await.session_id.clone();
        let job = ImageJob::new(new_id(), session_id, device_id.to_string(), bytes, payload.mime, payload.question, Utc::now());

        match self.ingest.enqueue(job).await {
            Ok(()) => self.send_command(session, device_id, EnvelopePayload::Ack(AckPayload { ack_seq: session.lock().await.last_recv_seq })).await,
            Err(e) => {
                tracing::warn!(error = %e, "image ingest rejected");
                Ok(())
            }
        }
    }

    async fn session_key(&self, session: &Arc<TokioMutex<opencane_core::domain::Session>>) -> SessionKey {
        let guard = session.lock().await;
        self.key_from_session(&guard)
    }

    fn key_from_session(&self, session: &opencane_core::domain::Session) -> SessionKey {
        (session.device_id.clone(), session.session_id.clone())
    }

    async fn pipeline_for(&self, key: &SessionKey) -> Arc<TokioMutex<VoicePipeline>> {
        if let Some(existing) = self.voice_pipelines.read().await.get(key) {
            return Arc::clone(existing);
        }
        let mut pipelines = self.voice_pipelines.write().await;
        if let Some(existing) = pipelines.get(key) {
            return Arc::clone(existing);
        }
        let config = VoicePipelineConfig {
            jitter_window_packets: self.config.jitter_window_packets,
            jitter_window: self.config.jitter_window,
            ..Default::default()
        };
        let (pipeline, event_rx) = VoicePipeline::new(config, Arc::clone(&self.stt_backend), Arc::clone(&self.tts_backend));
        let handle = Arc::new(TokioMutex::new(pipeline));
        pipelines.insert(key.clone(), Arc::clone(&handle));
        self.spawn_event_collector(key.clone(), event_rx);
        handle
    }

    /// Buffers voice events per session between `speak()` calls so
    /// [`Self::drain_voice_events`] can forward them after synthesis
    /// completes, without the pipeline and the dispatch loop needing a
    /// shared lock on the same channel.
    fn spawn_event_collector(&self, key: SessionKey, mut event_rx: tokio::sync::mpsc::UnboundedReceiver<VoiceEvent>) {
        let queues = Arc::clone(&self.voice_event_queues);
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                queues.write().await.entry(key.clone()).or_default().push(event);
            }
        });
    }
}

/// Delivers vision-pipeline replies through the same safety gate and TTS
/// path as dialogue replies, sourced as [`ResponseSource::SensorAlert`]
/// (spec §4.10: a vision description is not model free-form dialogue).
/// Tracks P0 risk hints for rule 4's conflict check.
#[async_trait]
impl VisionReplySink for ConnectionRuntime {
    async fn deliver_vision_reply(
        &self,
        session_id: &str,
        device_id: &str,
        _job_id: &str,
        text: &str,
        risk_level: Option<RiskLevel>,
    ) {
        if risk_level == Some(RiskLevel::P0) {
            self.recent_p0.write().await.insert(
                session_id.to_string(),
                RecentP0Hint { text: text.to_string(), issued_at: Utc::now() },
            );
        }

        let session = self.session_manager.get_or_create(device_id, Some(session_id)).await;
        let key = (device_id.to_string(), session_id.to_string());
        if let Err(e) = self
            .speak_reply(&session, device_id, &key, text.to_string(), ResponseSource::SensorAlert, 1.0)
            .await
        {
            tracing::warn!(error = %e, "failed to deliver vision reply");
        }
    }
}

/// Delivers a `task_update` command through the ordinary session/outbound-seq
/// path, buffering into `pending_commands` like any other command when the
/// device is offline (spec §4.9: pushes replay on the device's next `hello`).
#[async_trait]
impl TaskPushSink for ConnectionRuntime {
    async fn deliver_task_push(&self, device_id: &str, task_id: &str, status: DigitalTaskStatus, message: &str) -> bool {
        let session = self.session_manager.get_or_create(device_id, None).await;
        self.send_command(
            &session,
            device_id,
            EnvelopePayload::TaskUpdate(TaskUpdatePayload {
                task_id: task_id.to_string(),
                status: format!("{status:?}").to_lowercase(),
                message: message.to_string(),
            }),
        )
        .await
        .is_ok()
    }
}

fn pcm16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / f32::from(i16::MAX))
        .collect()
}

fn f32_to_pcm16le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * f32::from(i16::MAX)) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

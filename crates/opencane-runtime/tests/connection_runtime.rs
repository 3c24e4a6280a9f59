//! End-to-end tests for [`ConnectionRuntime`] driven through a
//! [`MockAdapter`]: envelope in, command(s) out, covering the handshake,
//! a voice turn, barge-in, duplicate replay, and image ingest from the
//! connection runtime's transition table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use opencane_agent::safety::default_rules;
use opencane_core::domain::{DigitalTask, DigitalTaskStatus, ImageJob, Operation, OperationStatus};
use opencane_core::envelope::{
    AudioChunkPayload, Envelope, EnvelopePayload, HelloPayload, ImageReadyPayload,
    ListenStartPayload, ListenStopPayload,
};
use opencane_core::ports::{
    DialogueEngine, DialogueError, DialogueReply, LifelogContext, LifelogImageRecord,
    ObservabilitySample, SafetyAudit, SessionSnapshot, StepResult, Store, StoreError, TaskPush,
    ToolExecutor, ToolExecutorError,
};
use opencane_core::settings::{OverflowPolicy, RuntimeConfig};
use opencane_runtime::{
    ConnectionRuntime, ImageJobProcessor, IngestQueue, SessionManager, TaskExecutor,
    TaskExecutorConfig, TaskPushSink,
};
use opencane_transport::adapter::mock::MockAdapter;
use opencane_transport::adapter::TransportAdapter;
use opencane_voice::backend::{SttBackend, TtsAudio, TtsBackend, VoiceInfo};
use opencane_voice::error::VoiceError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct InMemoryStore {
    snapshots: StdMutex<HashMap<(String, String), SessionSnapshot>>,
    audits: StdMutex<Vec<SafetyAudit>>,
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_session_snapshot(&self, snapshot: SessionSnapshot) -> Result<(), StoreError> {
        self.snapshots
            .lock()
            .unwrap()
            .insert((snapshot.device_id.clone(), snapshot.session_id.clone()), snapshot);
        Ok(())
    }
    async fn load_session_snapshot(&self, device_id: &str, session_id: &str) -> Result<Option<SessionSnapshot>, StoreError> {
        Ok(self.snapshots.lock().unwrap().get(&(device_id.to_string(), session_id.to_string())).cloned())
    }
    async fn insert_lifelog_event(&self, _: &str, _: &str, _: Value, _: chrono::DateTime<Utc>) -> Result<(), StoreError> { Ok(()) }
    async fn query_lifelog_timeline(&self, _: &str, _: usize) -> Result<Vec<(chrono::DateTime<Utc>, String, Value)>, StoreError> { Ok(vec![]) }
    async fn insert_lifelog_image(&self, _: LifelogImageRecord) -> Result<(), StoreError> { Ok(()) }
    async fn recent_lifelog_images(&self, _: &str, _: chrono::DateTime<Utc>) -> Result<Vec<LifelogImageRecord>, StoreError> { Ok(vec![]) }
    async fn insert_lifelog_context(&self, _: LifelogContext) -> Result<(), StoreError> { Ok(()) }
    async fn lifelog_context_for_job(&self, _: &str) -> Result<Option<LifelogContext>, StoreError> { Ok(None) }
    async fn insert_task(&self, _: &DigitalTask) -> Result<(), StoreError> { Ok(()) }
    async fn update_task(&self, _: &DigitalTask) -> Result<(), StoreError> { Ok(()) }
    async fn load_task(&self, _: &str) -> Result<Option<DigitalTask>, StoreError> { Ok(None) }
    async fn list_tasks_for_device(&self, _: &str) -> Result<Vec<DigitalTask>, StoreError> { Ok(vec![]) }
    async fn list_non_terminal_tasks(&self) -> Result<Vec<DigitalTask>, StoreError> { Ok(vec![]) }
    async fn find_non_terminal_task_for_device(&self, _: &str) -> Result<Option<DigitalTask>, StoreError> { Ok(None) }
    async fn enqueue_task_push(&self, _: &str, _: &str, _: DigitalTaskStatus, _: &str, _: chrono::DateTime<Utc>) -> Result<(), StoreError> { Ok(()) }
    async fn due_task_pushes(&self, _: chrono::DateTime<Utc>) -> Result<Vec<TaskPush>, StoreError> { Ok(vec![]) }
    async fn mark_task_push_sent(&self, _: &str) -> Result<(), StoreError> { Ok(()) }
    async fn reschedule_task_push(&self, _: &str, _: chrono::DateTime<Utc>) -> Result<(), StoreError> { Ok(()) }
    async fn pending_task_pushes_for_device(&self, _: &str) -> Result<Vec<TaskPush>, StoreError> { Ok(vec![]) }
    async fn enqueue_operation(&self, _: &Operation) -> Result<(), StoreError> { Ok(()) }
    async fn mark_operation_status(&self, _: &str, _: OperationStatus) -> Result<(), StoreError> { Ok(()) }
    async fn query_operations(&self, _: &str) -> Result<Vec<Operation>, StoreError> { Ok(vec![]) }
    async fn insert_thought_trace(&self, _: &str, _: Option<&str>, _: Value, _: chrono::DateTime<Utc>) -> Result<(), StoreError> { Ok(()) }
    async fn record_safety_audit(&self, audit: SafetyAudit) -> Result<(), StoreError> {
        self.audits.lock().unwrap().push(audit);
        Ok(())
    }
    async fn query_safety_audits(&self, _: Option<&str>, _: usize) -> Result<Vec<SafetyAudit>, StoreError> { Ok(vec![]) }
    async fn insert_observability_sample(&self, _: ObservabilitySample) -> Result<(), StoreError> { Ok(()) }
    async fn observability_history(&self, _: chrono::DateTime<Utc>) -> Result<Vec<ObservabilitySample>, StoreError> { Ok(vec![]) }
}

struct EchoDialogue;
#[async_trait]
impl DialogueEngine for EchoDialogue {
    async fn reply(&self, _session_context: &Value, transcript: &str) -> Result<DialogueReply, DialogueError> {
        Ok(DialogueReply { text: format!("you said: {transcript}"), thought_trace: None })
    }
}

struct EchoStt;
#[async_trait]
impl SttBackend for EchoStt {
    async fn transcribe(&self, audio: &[f32]) -> Result<String, VoiceError> {
        Ok(format!("heard {} samples", audio.len()))
    }
    fn language(&self) -> &str {
        "en"
    }
}

struct SilentTts;
#[async_trait]
impl TtsBackend for SilentTts {
    async fn synthesize(&self, _text: &str) -> Result<TtsAudio, VoiceError> {
        Ok(TtsAudio { samples: vec![0.0; 8], sample_rate: 16_000, duration: Duration::ZERO })
    }
    fn set_voice(&mut self, _voice_id: &str) {}
    fn set_speed(&mut self, _speed: f32) {}
    fn voice(&self) -> String {
        "default".to_string()
    }
    fn sample_rate(&self) -> u32 {
        16_000
    }
    fn available_voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }
}

struct NoMatchExecutor;
#[async_trait]
impl ToolExecutor for NoMatchExecutor {
    async fn execute(&self, _step: &str) -> Result<StepResult, ToolExecutorError> {
        Err(ToolExecutorError::NoMatchingTool)
    }
}

struct NullPushSink;
#[async_trait]
impl TaskPushSink for NullPushSink {
    async fn deliver_task_push(&self, _device_id: &str, _task_id: &str, _status: DigitalTaskStatus, _message: &str) -> bool {
        true
    }
}

struct NoopProcessor;
#[async_trait]
impl ImageJobProcessor for NoopProcessor {
    async fn process(&self, _job: ImageJob, _cancel: CancellationToken) {}
}

/// Builds a [`ConnectionRuntime`] wired to an in-process [`MockAdapter`],
/// returning both so tests can inject inbound envelopes and drain outbound
/// ones.
fn harness() -> (Arc<ConnectionRuntime>, Arc<MockAdapter>) {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
    let session_manager = Arc::new(SessionManager::new(Arc::clone(&store), 64, 256));
    let mock = Arc::new(MockAdapter::new());
    let adapter: Arc<dyn TransportAdapter> = Arc::clone(&mock) as Arc<dyn TransportAdapter>;
    let dialogue: Arc<dyn DialogueEngine> = Arc::new(EchoDialogue);
    let stt: Arc<dyn SttBackend> = Arc::new(EchoStt);
    let tts: Arc<dyn TtsBackend> = Arc::new(SilentTts);
    let ingest = Arc::new(IngestQueue::new(8, 1, OverflowPolicy::Reject, Arc::new(NoopProcessor)));
    let task_executor = Arc::new(TaskExecutor::new(
        Arc::clone(&store),
        Arc::new(NoMatchExecutor),
        Arc::new(NoMatchExecutor),
        Arc::new(NullPushSink),
        TaskExecutorConfig { max_concurrent_tasks: 4, status_retry_count: 5, status_retry_backoff: Duration::from_millis(10) },
    ));
    let safety_rules = default_rules(0.4);

    let runtime = Arc::new(ConnectionRuntime::new(
        session_manager,
        adapter,
        dialogue,
        stt,
        tts,
        ingest,
        task_executor,
        store,
        safety_rules,
        RuntimeConfig::default(),
    ));
    (runtime, mock)
}

fn hello(device_id: &str, seq: u64) -> Envelope {
    Envelope {
        version: "0.1".to_string(),
        msg_id: format!("m{seq}"),
        device_id: device_id.to_string(),
        session_id: None,
        seq: Some(seq),
        ts: 0,
        payload: EnvelopePayload::Hello(HelloPayload { last_recv_seq: None, modem_profile: None, firmware_version: None }),
    }
}

fn envelope(device_id: &str, seq: u64, payload: EnvelopePayload) -> Envelope {
    Envelope {
        version: "0.1".to_string(),
        msg_id: format!("m{seq}"),
        device_id: device_id.to_string(),
        session_id: None,
        seq: Some(seq),
        ts: 0,
        payload,
    }
}

/// Spawns `runtime.run()` in the background and returns its `JoinHandle`.
fn spawn_runtime(runtime: Arc<ConnectionRuntime>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { runtime.run().await })
}

#[tokio::test]
async fn hello_is_answered_with_hello_ack() {
    let (runtime, mock) = harness();
    let _handle = spawn_runtime(runtime);

    mock.inject(hello("dev-1", 1)).await.unwrap();
    let sent = mock.take_sent().await.expect("a command was sent");
    assert_eq!(sent.type_name(), "hello_ack");
}

#[tokio::test]
async fn duplicate_hello_reemits_hello_ack_instead_of_being_dropped() {
    let (runtime, mock) = harness();
    let _handle = spawn_runtime(runtime);

    mock.inject(hello("dev-1", 1)).await.unwrap();
    let first = mock.take_sent().await.expect("first hello_ack");
    assert_eq!(first.type_name(), "hello_ack");

    // Same seq again: a duplicate per spec's seq watermark rule, still
    // expected to re-emit exactly one hello_ack (spec §8 invariant 3).
    mock.inject(hello("dev-1", 1)).await.unwrap();
    let second = mock.take_sent().await.expect("re-emitted hello_ack");
    assert_eq!(second.type_name(), "hello_ack");
}

#[tokio::test]
async fn voice_turn_drives_a_dialogue_reply_through_tts_start_and_stop() {
    let (runtime, mock) = harness();
    let _handle = spawn_runtime(runtime);

    mock.inject(hello("dev-1", 1)).await.unwrap();
    assert_eq!(mock.take_sent().await.unwrap().type_name(), "hello_ack");

    mock.inject(envelope("dev-1", 2, EnvelopePayload::ListenStart(ListenStartPayload { turn_id: None }))).await.unwrap();

    let audio_b64 = BASE64.encode([0u8; 32]);
    mock.inject(envelope("dev-1", 3, EnvelopePayload::AudioChunk(AudioChunkPayload { audio_b64 }))).await.unwrap();

    mock.inject(envelope(
        "dev-1",
        4,
        EnvelopePayload::ListenStop(ListenStopPayload { transcript: Some("turn the light on".to_string()) }),
    ))
    .await
    .unwrap();

    // `listen_start`/`audio_chunk` are not ack-able by a separate command in
    // this path (audio is buffered silently); the next commands out are the
    // TTS framing around the dialogue reply. Drain until `tts_stop`,
    // tolerating zero or more `tts_chunk`s in between (their delivery
    // timing depends on the voice event collector task).
    let mut seen = Vec::new();
    loop {
        let sent = tokio::time::timeout(Duration::from_secs(1), mock.take_sent())
            .await
            .expect("command arrives within timeout")
            .expect("adapter still open");
        let name = sent.type_name();
        let done = name == "tts_stop";
        seen.push(name);
        if done {
            break;
        }
    }

    assert_eq!(seen.first().map(String::as_str), Some("tts_start"));
    assert_eq!(seen.last().map(String::as_str), Some("tts_stop"));
}

#[tokio::test]
async fn listen_start_after_a_completed_reply_emits_no_spurious_tts_stop() {
    // The barge-in path (`listen_start` while the session is still
    // SPEAKING) needs a window where synthesis is in flight; with
    // synchronous stub backends the reply completes within a single
    // `dispatch()` call, so there's no such window to inject into here.
    // This instead covers the adjacent case: once a reply has finished
    // and the session is back to READY, a plain `listen_start` must not
    // emit a command at all (in particular, no `tts_stop`).
    let (runtime, mock) = harness();
    let _handle = spawn_runtime(runtime);

    mock.inject(hello("dev-1", 1)).await.unwrap();
    assert_eq!(mock.take_sent().await.unwrap().type_name(), "hello_ack");

    mock.inject(envelope("dev-1", 2, EnvelopePayload::ListenStart(ListenStartPayload { turn_id: None }))).await.unwrap();
    mock.inject(envelope(
        "dev-1",
        3,
        EnvelopePayload::ListenStop(ListenStopPayload { transcript: Some("hello there".to_string()) }),
    ))
    .await
    .unwrap();

    let mut saw_tts_stop = false;
    loop {
        let sent = tokio::time::timeout(Duration::from_secs(1), mock.take_sent()).await.unwrap().unwrap();
        if sent.type_name() == "tts_stop" {
            saw_tts_stop = true;
            break;
        }
    }
    assert!(saw_tts_stop);

    mock.inject(envelope("dev-1", 4, EnvelopePayload::ListenStart(ListenStartPayload { turn_id: None }))).await.unwrap();
    // No command is emitted solely for opening a new segment; confirm the
    // queue stays empty rather than producing an unexpected abort.
    let nothing = tokio::time::timeout(Duration::from_millis(200), mock.take_sent()).await;
    assert!(nothing.is_err(), "listen_start alone should not emit a command");
}

#[tokio::test]
async fn image_ready_is_enqueued_and_acked() {
    let (runtime, mock) = harness();
    let _handle = spawn_runtime(runtime);

    mock.inject(hello("dev-1", 1)).await.unwrap();
    assert_eq!(mock.take_sent().await.unwrap().type_name(), "hello_ack");

    let image_b64 = BASE64.encode([0xFFu8; 16]);
    mock.inject(envelope(
        "dev-1",
        2,
        EnvelopePayload::ImageReady(ImageReadyPayload { image_b64, mime: "image/jpeg".to_string(), question: None }),
    ))
    .await
    .unwrap();

    let sent = tokio::time::timeout(Duration::from_secs(1), mock.take_sent()).await.unwrap().unwrap();
    assert_eq!(sent.type_name(), "ack");
}

#[tokio::test]
async fn malformed_base64_image_is_dropped_without_crashing_the_dispatcher() {
    let (runtime, mock) = harness();
    let _handle = spawn_runtime(runtime);

    mock.inject(hello("dev-1", 1)).await.unwrap();
    assert_eq!(mock.take_sent().await.unwrap().type_name(), "hello_ack");

    mock.inject(envelope(
        "dev-1",
        2,
        EnvelopePayload::ImageReady(ImageReadyPayload {
            image_b64: "not valid base64!!".to_string(),
            mime: "image/jpeg".to_string(),
            question: None,
        }),
    ))
    .await
    .unwrap();

    // Nothing is acked for a malformed payload, but the dispatcher keeps
    // running: a follow-up heartbeat still gets an ack.
    let nothing = tokio::time::timeout(Duration::from_millis(200), mock.take_sent()).await;
    assert!(nothing.is_err());

    mock.inject(envelope(
        "dev-1",
        3,
        EnvelopePayload::Heartbeat(opencane_core::envelope::HeartbeatPayload::default()),
    ))
    .await
    .unwrap();
    let sent = tokio::time::timeout(Duration::from_secs(1), mock.take_sent()).await.unwrap().unwrap();
    assert_eq!(sent.type_name(), "ack");
}

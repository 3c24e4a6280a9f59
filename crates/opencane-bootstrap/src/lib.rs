//! Composition root (spec §2/§9): builds the single [`RuntimeContext`] and
//! wires providers, transports, the runtime, and the HTTP server together.
//!
//! Grounded on the teacher's `gglib-axum::bootstrap::{AxumContext,
//! bootstrap}` — one struct holding every shared service `Arc`, built by a
//! single async function with numbered construction steps — generalized
//! from "one web server's dependencies" to "the whole runtime's". This
//! crate owns `RuntimeContext` construction only; `opencane-axum` depends
//! on this crate (for `AppState`) rather than the other way around, so
//! starting the HTTP server is left to the `opencane-cli` binary, which
//! depends on both.

#![deny(unsafe_code)]

pub mod connections;
pub mod devices;
pub mod providers;
pub mod tool_executor;
pub mod vector_index;

use std::sync::Arc;

use anyhow::Context;
use opencane_agent::safety::{default_rules, SafetyRule};
use opencane_core::ports::{DialogueEngine, Store, ToolExecutor, VectorIndex};
use opencane_core::settings::RuntimeConfig;
use opencane_db::asset_store::AssetStore;
use opencane_db::{setup_database, SqliteStore};
use opencane_mcp::{McpManager, McpToolExecutor};
use opencane_runtime::{ConnectionRuntime, IngestQueue, SessionManager, TaskExecutor, TaskExecutorConfig, TaskPushSink, VisionPipeline, VisionPipelineConfig, VisionReplySink};
use opencane_transport::adapter::TransportAdapter;
use opencane_transport::{EC600MqttAdapter, GenericMqttAdapter, MockAdapter};
use opencane_voice::{HttpSttBackend, HttpTranscriptionProvider, HttpTtsBackend, HttpTtsProvider, SttBackend, TtsBackend};

use connections::ConnectionRegistry;
use devices::DeviceRegistry;
use providers::{HttpDialogueEngine, HttpVisionProvider};
use tool_executor::NoopToolExecutor;
use vector_index::InMemoryVectorIndex;

/// Every shared service the runtime needs, built once at startup (spec §9).
pub struct RuntimeContext {
    pub config: RuntimeConfig,
    pub store: Arc<dyn Store>,
    pub session_manager: Arc<SessionManager>,
    pub ingest: Arc<IngestQueue>,
    pub task_executor: Arc<TaskExecutor>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub dialogue: Arc<dyn DialogueEngine>,
    pub stt_backend: Arc<dyn SttBackend>,
    pub tts_backend: Arc<dyn TtsBackend>,
    pub devices: Arc<DeviceRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub mock_adapter: Arc<MockAdapter>,
    pub mcp_manager: Arc<McpManager>,
}

impl RuntimeContext {
    /// Build every shared service and recover any in-flight digital tasks
    /// from a previous run (spec §4.9 startup recovery).
    pub async fn build(config: RuntimeConfig) -> anyhow::Result<Arc<Self>> {
        // 1. Database pool and the Store/asset-store pair built on top of it.
        let db_path = opencane_core::paths::database_path().context("resolving database path")?;
        let pool = setup_database(&db_path).await.context("opening database")?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let data_root = opencane_core::paths::data_root().context("resolving data root")?;
        let asset_store = Arc::new(AssetStore::new(data_root));

        // 2. Session Manager (C4), shared by every connection.
        let session_manager = Arc::new(SessionManager::new(
            Arc::clone(&store),
            config.replay_window_size,
            config.replay_window_size,
        ));

        // 3. External-provider adapters (spec §6.4): HTTP-calling ports,
        // the only concrete implementations this workspace carries.
        let transcription_provider = Arc::new(HttpTranscriptionProvider::new(config.transcription_endpoint.clone()));
        let stt_backend: Arc<dyn SttBackend> = Arc::new(HttpSttBackend::new(transcription_provider, "en".to_string()));
        let tts_provider = Arc::new(HttpTtsProvider::new(config.tts_endpoint.clone()));
        let tts_backend: Arc<dyn TtsBackend> = Arc::new(HttpTtsBackend::new(tts_provider, "af_sarah".to_string(), 1.0));
        let dialogue: Arc<dyn DialogueEngine> = Arc::new(HttpDialogueEngine::new(config.dialogue_endpoint.clone()));
        let vision_provider = Arc::new(HttpVisionProvider::new(config.vision_endpoint.clone()));
        let vector_index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());

        // 4. Connection registry: routes the Vision Pipeline's replies and
        // the Task Executor's pushes to whichever live connection currently
        // owns a device (see `connections` module doc comment).
        let connections = Arc::new(ConnectionRegistry::new());

        // 5. Vision Pipeline (C8) + Ingest Queue (C7).
        let dedup_window =
            chrono::Duration::from_std(config.dedup_window).context("dedup_window out of range")?;
        let vision_pipeline = Arc::new(VisionPipeline::new(
            Arc::clone(&store),
            vision_provider,
            Arc::clone(&vector_index),
            asset_store,
            Arc::clone(&connections) as Arc<dyn VisionReplySink>,
            VisionPipelineConfig { dedup_hamming_threshold: config.dedup_hamming_threshold, dedup_window },
        ));
        let ingest = Arc::new(IngestQueue::new(
            config.ingest_queue_capacity,
            config.ingest_workers,
            config.ingest_overflow_policy,
            vision_pipeline,
        ));
        ingest.spawn_workers();

        // 6. MCP manager (no servers configured at startup — spec treats
        // them as deployment configuration, not a stored resource) and the
        // Digital Task Executor (C9 infra half), MCP-first-then-fallback.
        let mcp_manager = Arc::new(McpManager::new());
        let mcp_executor: Arc<dyn ToolExecutor> = Arc::new(McpToolExecutor::new(Arc::clone(&mcp_manager)));
        let fallback_executor: Arc<dyn ToolExecutor> = Arc::new(NoopToolExecutor);
        let task_executor = Arc::new(TaskExecutor::new(
            Arc::clone(&store),
            mcp_executor,
            fallback_executor,
            Arc::clone(&connections) as Arc<dyn TaskPushSink>,
            TaskExecutorConfig {
                max_concurrent_tasks: config.max_concurrent_tasks,
                status_retry_count: config.status_retry_count,
                status_retry_backoff: config.status_retry_backoff,
            },
        ));
        task_executor.recover_on_startup().await.context("recovering digital tasks on startup")?;

        // 7. Device identity registry (spec §6.2; no persisted schema per
        // spec §6.3 — see `devices` module doc comment).
        let devices = Arc::new(DeviceRegistry::new());

        let context = Arc::new(Self {
            config,
            store,
            session_manager,
            ingest,
            task_executor,
            vector_index,
            dialogue,
            stt_backend,
            tts_backend,
            devices,
            connections,
            mock_adapter: Arc::new(MockAdapter::new()),
            mcp_manager,
        });

        // 8. A dedicated connection over `MockAdapter` backing the
        // `POST /v1/device/event` injection endpoint (spec §4.3 — the
        // adapter's own doc comment names this as its purpose). Not
        // registered in `connections`: the mock adapter is shared across
        // whatever `device_id` an injected envelope names, so it has no
        // single device to route vision/task pushes back to.
        let mock_runtime = context.new_connection_runtime(Arc::clone(&context.mock_adapter) as Arc<dyn TransportAdapter>);
        tokio::spawn(mock_runtime.run());

        Ok(context)
    }

    fn safety_rules(&self) -> Vec<Box<dyn SafetyRule>> {
        default_rules(self.config.directional_confidence_threshold)
    }

    fn new_connection_runtime(&self, adapter: Arc<dyn TransportAdapter>) -> Arc<ConnectionRuntime> {
        Arc::new(ConnectionRuntime::new(
            Arc::clone(&self.session_manager),
            adapter,
            Arc::clone(&self.dialogue),
            Arc::clone(&self.stt_backend),
            Arc::clone(&self.tts_backend),
            Arc::clone(&self.ingest),
            Arc::clone(&self.task_executor),
            Arc::clone(&self.store),
            self.safety_rules(),
            self.config.clone(),
        ))
    }

    /// Construct a [`ConnectionRuntime`] over an already-accepted transport
    /// (the `opencane-axum` WebSocket upgrade handler's role) and spawn its
    /// dispatch loop, registering it so Vision/Task replies can reach it.
    pub async fn spawn_connection(self: &Arc<Self>, device_id: String, adapter: Arc<dyn TransportAdapter>) -> Arc<ConnectionRuntime> {
        let runtime = self.new_connection_runtime(adapter);
        self.connections.register(device_id, Arc::clone(&runtime)).await;
        tokio::spawn(Arc::clone(&runtime).run());
        runtime
    }

    /// Construct and start the `GenericMQTT`/`EC600MQTT` adapter for a
    /// device that has already been `bind`-ed to a modem profile (spec
    /// §4.2/§4.3), then spawn its connection the same way
    /// [`Self::spawn_connection`] does.
    pub async fn spawn_mqtt_connection(self: &Arc<Self>, device_id: &str) -> anyhow::Result<()> {
        let record = self
            .devices
            .get(device_id)
            .ok_or_else(|| anyhow::anyhow!("device {device_id} is not registered"))?;
        let profile_name = record
            .modem_profile
            .ok_or_else(|| anyhow::anyhow!("device {device_id} has not been bound to a modem profile"))?;
        let overrides = self.config.modem_profile_overrides.get(&profile_name);
        let profile = opencane_transport::lookup(&profile_name, overrides)?;

        let host = self.config.mqtt_broker_host.clone();
        let port = self.config.mqtt_broker_port;
        let adapter: Arc<dyn TransportAdapter> = if profile_name == "ec600mcnle_v1" {
            Arc::new(EC600MqttAdapter::new(profile, device_id.to_string(), host, port))
        } else {
            Arc::new(GenericMqttAdapter::new(profile, device_id.to_string(), host, port))
        };
        adapter.start().await?;
        self.spawn_connection(device_id.to_string(), adapter).await;
        Ok(())
    }
}

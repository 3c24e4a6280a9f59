//! Routes the shared Vision Pipeline's replies and the shared Digital Task
//! Executor's pushes to whichever live [`ConnectionRuntime`] currently owns
//! a device (spec §4.6/§4.8/§4.9) — `ConnectionRuntime` itself implements
//! both sink traits against its own single adapter, but the pipeline/
//! executor are process-wide singletons built once, before any device has
//! connected, so something has to multiplex "this device" to "that
//! connection" on their behalf. This registry is that multiplexer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use opencane_core::domain::DigitalTaskStatus;
use opencane_core::ports::RiskLevel;
use opencane_runtime::{ConnectionRuntime, TaskPushSink, VisionReplySink};
use tokio::sync::RwLock;

pub struct ConnectionRegistry {
    inner: RwLock<HashMap<String, Arc<ConnectionRuntime>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }

    pub async fn register(&self, device_id: String, runtime: Arc<ConnectionRuntime>) {
        self.inner.write().await.insert(device_id, runtime);
    }

    pub async fn unregister(&self, device_id: &str) {
        self.inner.write().await.remove(device_id);
    }

    pub async fn get(&self, device_id: &str) -> Option<Arc<ConnectionRuntime>> {
        self.inner.read().await.get(device_id).cloned()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VisionReplySink for ConnectionRegistry {
    async fn deliver_vision_reply(&self, session_id: &str, device_id: &str, job_id: &str, text: &str, risk_level: Option<RiskLevel>) {
        match self.get(device_id).await {
            Some(runtime) => runtime.deliver_vision_reply(session_id, device_id, job_id, text, risk_level).await,
            None => tracing::warn!(device_id, "no active connection for vision reply"),
        }
    }
}

#[async_trait]
impl TaskPushSink for ConnectionRegistry {
    async fn deliver_task_push(&self, device_id: &str, task_id: &str, status: DigitalTaskStatus, message: &str) -> bool {
        match self.get(device_id).await {
            Some(runtime) => runtime.deliver_task_push(device_id, task_id, status, message).await,
            None => false,
        }
    }
}

//! `DialogueEngine` (spec §6.4): the agent/tool execution engine that turns
//! a transcript into a textual reply. Its reasoning is explicitly out of
//! scope for this workspace (spec §1); only the interface is consumed here.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("dialogue engine call timed out")]
    Timeout,
    #[error("dialogue engine error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone)]
pub struct DialogueReply {
    pub text: String,
    pub thought_trace: Option<Value>,
}

#[async_trait]
pub trait DialogueEngine: Send + Sync {
    /// `session_context` is an opaque, implementation-defined blob (history,
    /// device profile, memory hits) this workspace never inspects.
    async fn reply(
        &self,
        session_context: &Value,
        transcript: &str,
    ) -> Result<DialogueReply, DialogueError>;
}

//! Fallback [`ToolExecutor`] for the Digital Task Executor's "MCP-first-
//! then-fallback" strategy (spec §4.9). No general web/exec tool engine
//! exists anywhere in this workspace's corpus — that reasoning is out of
//! scope the same way `DialogueEngine`'s is (spec §1). This always reports
//! no match so the executor's result reflects MCP coverage honestly rather
//! than pretending a second tool tier exists.

use async_trait::async_trait;
use opencane_core::ports::{StepResult, ToolExecutor, ToolExecutorError};

pub struct NoopToolExecutor;

#[async_trait]
impl ToolExecutor for NoopToolExecutor {
    async fn execute(&self, _step: &str) -> Result<StepResult, ToolExecutorError> {
        Err(ToolExecutorError::NoMatchingTool)
    }
}

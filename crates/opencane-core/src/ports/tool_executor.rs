//! `ToolExecutor` (spec §6.4, §4.9): a single tool-execution capability.
//! The Digital Task Executor holds two implementations — an MCP-backed one
//! (`opencane-mcp`) tried first, and a fallback — and tries them in order
//! per task (spec §4.9 "MCP-first-then-fallback").

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolExecutorError {
    #[error("no tool matches this step's capability")]
    NoMatchingTool,
    #[error("tool execution timed out")]
    Timeout,
    #[error("tool execution was canceled")]
    Canceled,
    #[error("tool execution error: {0}")]
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub output: String,
    pub succeeded: bool,
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one step of a digital task's goal. `step` is the step
    /// description/goal text; callers are responsible for interpreting the
    /// strategy (MCP vs. fallback) this implementation represents.
    async fn execute(&self, step: &str) -> Result<StepResult, ToolExecutorError>;
}

//! `McpToolExecutor`: the MCP-backed half of the Digital Task Executor's
//! "MCP-first-then-fallback" tool discovery (spec §4.9, §6.4).
//!
//! Tool selection is naive keyword matching against each running server's
//! advertised tool name/description — the spec leaves tool selection
//! unspecified beyond "MCP-first"; a richer ranking belongs to a
//! `DialogueEngine`/planner, not this executor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use opencane_core::ports::{StepResult, ToolExecutor, ToolExecutorError};

use crate::manager::McpManager;
use crate::types::McpTool;

pub struct McpToolExecutor {
    manager: Arc<McpManager>,
}

impl McpToolExecutor {
    #[must_use]
    pub fn new(manager: Arc<McpManager>) -> Self {
        Self { manager }
    }

    fn score(step: &str, tool: &McpTool) -> usize {
        let step_lower = step.to_lowercase();
        let mut score = 0;
        if step_lower.contains(&tool.name.to_lowercase()) {
            score += 2;
        }
        if let Some(description) = &tool.description {
            let words = description.to_lowercase();
            score += words
                .split_whitespace()
                .filter(|word| word.len() > 3 && step_lower.contains(*word))
                .count();
        }
        score
    }

    async fn best_match(&self, step: &str) -> Option<(String, McpTool)> {
        let candidates = self.manager.get_all_tools().await;
        candidates
            .into_iter()
            .flat_map(|(server, tools)| tools.into_iter().map(move |tool| (server.clone(), tool)))
            .map(|(server, tool)| {
                let score = Self::score(step, &tool);
                (score, server, tool)
            })
            .filter(|(score, _, _)| *score > 0)
            .max_by_key(|(score, _, _)| *score)
            .map(|(_, server, tool)| (server, tool))
    }
}

#[async_trait]
impl ToolExecutor for McpToolExecutor {
    async fn execute(&self, step: &str) -> Result<StepResult, ToolExecutorError> {
        let Some((server, tool)) = self.best_match(step).await else {
            return Err(ToolExecutorError::NoMatchingTool);
        };

        let arguments: HashMap<String, serde_json::Value> =
            HashMap::from([("input".to_string(), json!(step))]);

        let result = self
            .manager
            .call_tool(&server, &tool.name, arguments)
            .await
            .map_err(|e| ToolExecutorError::Failed(e.to_string()))?;

        if result.success {
            Ok(StepResult {
                output: result.data.map(|v| v.to_string()).unwrap_or_default(),
                succeeded: true,
            })
        } else {
            Ok(StepResult {
                output: result.error.unwrap_or_else(|| "tool call failed".to_string()),
                succeeded: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_name_match_higher_than_no_match() {
        let tool = McpTool {
            name: "book_ride".to_string(),
            description: Some("Book a rideshare to a destination".to_string()),
            input_schema: None,
        };
        assert!(McpToolExecutor::score("please book a ride to the station", &tool) > 0);
        assert_eq!(McpToolExecutor::score("turn off the lights", &tool), 0);
    }

    #[tokio::test]
    async fn no_running_servers_yields_no_matching_tool() {
        let manager = Arc::new(McpManager::new());
        let executor = McpToolExecutor::new(manager);
        let result = executor.execute("book a ride").await;
        assert!(matches!(result, Err(ToolExecutorError::NoMatchingTool)));
    }
}

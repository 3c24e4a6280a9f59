//! MCP server lifecycle management.
//!
//! Manages starting, stopping, and monitoring MCP server processes. Depends
//! only on [`crate::client::McpClient`] and this crate's own DTOs — no
//! persistence, since server registration is deployment configuration here
//! (spec treats MCP servers as configured endpoints, not a stored resource).

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::client::{McpClient, McpClientError};
use crate::types::{McpServerConfig, McpServerStatus, McpServerType, McpTool, McpToolResult};

#[derive(Debug, Error)]
pub enum McpManagerError {
    #[error("server already running: {0}")]
    AlreadyRunning(String),
    #[error("server not running: {0}")]
    NotRunning(String),
    #[error("failed to start server: {0}")]
    StartFailed(String),
    #[error("client error: {0}")]
    ClientError(#[from] McpClientError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

struct RunningServer {
    client: McpClient,
    status: McpServerStatus,
    tools: Vec<McpTool>,
}

pub struct McpManager {
    servers: Arc<RwLock<HashMap<String, RunningServer>>>,
}

impl McpManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            servers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn start_server(&self, config: McpServerConfig) -> Result<Vec<McpTool>, McpManagerError> {
        {
            let servers = self.servers.read().await;
            if servers.contains_key(&config.name) {
                return Err(McpManagerError::AlreadyRunning(config.name));
            }
        }

        let (client, tools) = match config.server_type {
            McpServerType::Stdio => self.start_stdio_server(&config).await?,
            McpServerType::Sse => {
                return Err(McpManagerError::InvalidConfig(
                    "SSE servers are not supported".to_string(),
                ));
            }
        };

        let mut servers = self.servers.write().await;
        servers.insert(
            config.name,
            RunningServer {
                client,
                status: McpServerStatus::Running,
                tools: tools.clone(),
            },
        );
        Ok(tools)
    }

    async fn start_stdio_server(
        &self,
        config: &McpServerConfig,
    ) -> Result<(McpClient, Vec<McpTool>), McpManagerError> {
        let exe_path = config
            .command
            .as_ref()
            .ok_or_else(|| McpManagerError::InvalidConfig("no command configured".to_string()))?;

        let mut client = McpClient::new();
        client
            .connect_stdio(
                exe_path,
                &config.args,
                config.working_dir.as_deref(),
                config.path_extra.as_deref(),
                &config.env,
            )
            .await
            .map_err(|e| McpManagerError::StartFailed(e.to_string()))?;

        let tools = client
            .list_tools()
            .await
            .map_err(|e| McpManagerError::StartFailed(format!("failed to list tools: {e}")))?;

        tracing::info!(server_name = %config.name, tool_count = tools.len(), "MCP server started");
        Ok((client, tools))
    }

    pub async fn stop_server(&self, name: &str) -> Result<(), McpManagerError> {
        let mut server = {
            let mut servers = self.servers.write().await;
            servers
                .remove(name)
                .ok_or_else(|| McpManagerError::NotRunning(name.to_string()))?
        };
        server.client.disconnect();
        tracing::info!(server_name = %name, "MCP server stopped");
        Ok(())
    }

    pub async fn get_status(&self, name: &str) -> McpServerStatus {
        let servers = self.servers.read().await;
        servers.get(name).map_or(McpServerStatus::Stopped, |s| s.status.clone())
    }

    /// All `(server_name, tools)` pairs across running servers, for tool
    /// discovery by the MCP-backed `ToolExecutor` (spec §4.9).
    pub async fn get_all_tools(&self) -> Vec<(String, Vec<McpTool>)> {
        let servers = self.servers.read().await;
        servers.iter().map(|(name, s)| (name.clone(), s.tools.clone())).collect()
    }

    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: HashMap<String, serde_json::Value>,
    ) -> Result<McpToolResult, McpManagerError> {
        let servers = self.servers.read().await;
        let server = servers
            .get(server_name)
            .ok_or_else(|| McpManagerError::NotRunning(server_name.to_string()))?;
        server.client.call_tool(tool_name, arguments).await.map_err(Into::into)
    }

    pub async fn stop_all(&self) {
        let names: Vec<String> = {
            let servers = self.servers.read().await;
            servers.keys().cloned().collect()
        };
        for name in names {
            if let Err(e) = self.stop_server(&name).await {
                tracing::warn!(server_name = %name, error = %e, "failed to stop server");
            }
        }
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn server_not_running_reports_stopped() {
        let manager = McpManager::new();
        assert_eq!(manager.get_status("nonexistent").await, McpServerStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_nonexistent_server_errors() {
        let manager = McpManager::new();
        let result = manager.stop_server("nonexistent").await;
        assert!(matches!(result, Err(McpManagerError::NotRunning(_))));
    }

    #[tokio::test]
    async fn sse_servers_are_rejected() {
        let manager = McpManager::new();
        let config = McpServerConfig {
            name: "sse-server".to_string(),
            server_type: McpServerType::Sse,
            ..McpServerConfig::default()
        };
        let result = manager.start_server(config).await;
        assert!(matches!(result, Err(McpManagerError::InvalidConfig(_))));
    }
}

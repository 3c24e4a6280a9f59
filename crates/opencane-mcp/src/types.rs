//! MCP server/tool DTOs. Trimmed from the teacher's persisted, frontend-shared
//! `McpServer`/`McpServerConfig` model to what a headless runtime needs:
//! static server configuration (spec treats MCP server registration as
//! deployment configuration, not a persisted resource) plus the wire shapes
//! exchanged with a running server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpServerType {
    #[default]
    Stdio,
    Sse,
}

/// One configured MCP server (spec §4.9 "MCP-first" tool discovery source).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub server_type: McpServerType,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    pub path_extra: Option<String>,
    pub env: Vec<(String, String)>,
}

impl McpServerConfig {
    #[must_use]
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            server_type: McpServerType::Stdio,
            command: Some(command.into()),
            args,
            working_dir: None,
            path_extra: None,
            env: Vec::new(),
        }
    }
}

/// Runtime status of a configured MCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum McpServerStatus {
    #[default]
    Stopped,
    Running,
}

/// Tool definition from an MCP server's `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Result of a `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl McpToolResult {
    #[must_use]
    pub const fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

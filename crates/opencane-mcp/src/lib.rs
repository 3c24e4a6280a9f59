//! MCP (Model Context Protocol) server lifecycle management and the
//! MCP-backed `ToolExecutor` for the Digital Task Executor (spec §4.9,
//! §6.4).

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod client;
pub mod executor;
pub mod manager;
pub mod path;
pub mod types;

pub use client::{McpClient, McpClientError};
pub use executor::McpToolExecutor;
pub use manager::{McpManager, McpManagerError};
pub use types::{McpServerConfig, McpServerStatus, McpServerType, McpTool, McpToolResult};

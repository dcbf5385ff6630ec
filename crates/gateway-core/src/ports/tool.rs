//! The `ToolDispatcher` port: the seam `TurnEngine` calls through instead of
//! depending on `gateway-mcp` directly, keeping the agentic loop a pure
//! domain crate per the hexagonal boundary (§4.7/§4.8).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{ToolDefinition, ToolResult};

/// Unified view over `server_local`/`server_mcp`/`device_mcp` tool sources.
/// `gateway-mcp::ToolRegistry` is the concrete implementation.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Every tool across all registered sources, as OpenAI-style schemas.
    async fn get_functions(&self) -> Vec<ToolDefinition>;
    /// Resolve and invoke `name`, or `Action::NotFound` if no source claims it.
    async fn dispatch(&self, name: &str, arguments: HashMap<String, Value>) -> ToolResult;
}

//! `ToolRegistry`: unifies `server_local`, `server_mcp`, and `device_mcp`
//! tool sources behind a single function list and a single `dispatch`.
//!
//! `TurnEngine` owns the dispatch-policy decisions (RESPONSE/NOTFOUND/ERROR
//! speak directly; REQLLM batches into an assistant/tool message pair and
//! recurses) — this registry only resolves a name to a source and returns
//! its `ToolResult`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use gateway_core::{ToolDefinition, ToolDispatcher, ToolResult};

use crate::device_mcp::DeviceMcpClient;
use crate::server_mcp::ServerMcpClient;

/// An in-process function registered at startup (`server_local`).
#[async_trait]
pub trait LocalFunction: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn call(&self, arguments: HashMap<String, Value>) -> ToolResult;
}

#[derive(Default)]
pub struct ToolRegistry {
    local: Vec<Arc<dyn LocalFunction>>,
    server_mcp: Vec<Arc<ServerMcpClient>>,
    device_mcp: Option<Arc<DeviceMcpClient>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { local: Vec::new(), server_mcp: Vec::new(), device_mcp: None }
    }

    pub fn register_local(&mut self, function: Arc<dyn LocalFunction>) {
        self.local.push(function);
    }

    pub fn register_server_mcp(&mut self, client: Arc<ServerMcpClient>) {
        self.server_mcp.push(client);
    }

    pub fn set_device_mcp(&mut self, client: Arc<DeviceMcpClient>) {
        self.device_mcp = Some(client);
    }

    pub fn device_mcp(&self) -> Option<Arc<DeviceMcpClient>> {
        self.device_mcp.clone()
    }

    /// Every tool across all three sources, as OpenAI-style function schemas.
    pub async fn get_functions(&self) -> Vec<ToolDefinition> {
        let mut functions: Vec<ToolDefinition> = self.local.iter().map(|f| f.definition()).collect();
        for client in &self.server_mcp {
            functions.extend(client.tools().await);
        }
        if let Some(device) = &self.device_mcp {
            functions.extend(device.tools().await);
        }
        functions
    }

    /// Resolve `name` against local functions, then every server-hosted MCP
    /// client, then the device MCP client, in that order.
    pub async fn dispatch(&self, name: &str, arguments: HashMap<String, Value>) -> ToolResult {
        for function in &self.local {
            if function.definition().name == name {
                return function.call(arguments).await;
            }
        }

        for client in &self.server_mcp {
            if client.has_tool(name).await {
                return match client.dispatch(name, arguments).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(tool = name, error = %e, "server MCP dispatch failed");
                        ToolResult::error(e.to_string())
                    }
                };
            }
        }

        if let Some(device) = &self.device_mcp {
            if device.has_tool(name).await {
                return match device.call_tool(name, arguments).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(tool = name, error = %e, "device MCP dispatch failed");
                        ToolResult::error(e.to_string())
                    }
                };
            }
        }

        ToolResult::not_found(name)
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    async fn get_functions(&self) -> Vec<ToolDefinition> {
        Self::get_functions(self).await
    }

    async fn dispatch(&self, name: &str, arguments: HashMap<String, Value>) -> ToolResult {
        Self::dispatch(self, name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::Action;

    struct Echo;

    #[async_trait]
    impl LocalFunction for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("echo")
        }

        async fn call(&self, arguments: HashMap<String, Value>) -> ToolResult {
            ToolResult::response(arguments.get("text").and_then(Value::as_str).unwrap_or_default().to_string())
        }
    }

    #[tokio::test]
    async fn dispatch_resolves_local_functions_before_reporting_not_found() {
        let mut registry = ToolRegistry::new();
        registry.register_local(Arc::new(Echo));

        let mut args = HashMap::new();
        args.insert("text".to_string(), Value::String("hi".to_string()));
        let result = registry.dispatch("echo", args).await;
        assert_eq!(result.action, Action::Response);
        assert_eq!(result.text, "hi");
    }

    #[tokio::test]
    async fn dispatch_reports_not_found_for_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.dispatch("missing", HashMap::new()).await;
        assert_eq!(result.action, Action::NotFound);
    }

    #[tokio::test]
    async fn get_functions_collects_local_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register_local(Arc::new(Echo));
        let functions = registry.get_functions().await;
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "echo");
    }
}

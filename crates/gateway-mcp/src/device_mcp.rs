//! `device_mcp`: JSON-RPC 2.0 tool calls carried over the device's own
//! WebSocket connection, correlated by a per-connection pending-call table.
//!
//! Reserved ids: `1` = `initialize`, `2` = `tools/list` (same id reused
//! across `nextCursor` pages). Tool-call ids start at 3 and increase
//! monotonically for the lifetime of the connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex, RwLock};

use gateway_core::{ToolDefinition, ToolResult};

use crate::error::McpError;
use crate::server_mcp::sanitize_tool_name;
use crate::types::{McpTool, ToolCallOutcome};

const INITIALIZE_ID: u64 = 1;
const TOOLS_LIST_ID: u64 = 2;
const FIRST_CALL_ID: u64 = 3;
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends a JSON-RPC envelope out over the device's WebSocket. Implemented by
/// `gateway-server`'s connection loop; this crate only builds the envelope.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn send_json(&self, payload: Value) -> Result<(), McpError>;
}

/// One pending request, correlated by id, resolved by `handle_message` when
/// the matching response arrives on the device's inbound stream.
type PendingTable = Mutex<HashMap<u64, oneshot::Sender<Result<Value, McpError>>>>;

/// MCP client for tools hosted on the device itself, reached over its own
/// WebSocket rather than a side transport.
pub struct DeviceMcpClient {
    transport: Box<dyn DeviceTransport>,
    next_call_id: AtomicU64,
    pending: PendingTable,
    name_map: RwLock<HashMap<String, String>>,
    tools: RwLock<Vec<ToolDefinition>>,
    ready: RwLock<bool>,
}

impl DeviceMcpClient {
    #[must_use]
    pub fn new(transport: Box<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            next_call_id: AtomicU64::new(FIRST_CALL_ID),
            pending: Mutex::new(HashMap::new()),
            name_map: RwLock::new(HashMap::new()),
            tools: RwLock::new(Vec::new()),
            ready: RwLock::new(false),
        }
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn has_tool(&self, sanitized_name: &str) -> bool {
        self.name_map.read().await.contains_key(sanitized_name)
    }

    pub async fn tools(&self) -> Vec<ToolDefinition> {
        self.tools.read().await.clone()
    }

    /// Send the reserved `initialize` request (id 1) and await its response.
    pub async fn initialize(&self, client_name: &str, capabilities: Value) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": capabilities,
            "clientInfo": {"name": client_name, "version": env!("CARGO_PKG_VERSION")},
        });
        self.request(INITIALIZE_ID, "initialize", Some(params)).await?;
        Ok(())
    }

    /// Send `tools/list` (id 2), following `nextCursor` pages until
    /// exhausted, then mark the client ready.
    pub async fn request_tools_list(&self) -> Result<(), McpError> {
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({"cursor": c}));
            let result = self.request(TOOLS_LIST_ID, "tools/list", params).await?;

            let tools_data = result
                .get("tools")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for raw in tools_data {
                let Ok(tool) = serde_json::from_value::<McpTool>(raw) else { continue };
                self.add_tool(tool).await;
            }

            self.rewrite_descriptions_with_sanitized_names().await;

            match result.get("nextCursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() => cursor = Some(next.to_string()),
                _ => break,
            }
        }
        self.set_ready(true).await;
        Ok(())
    }

    async fn add_tool(&self, tool: McpTool) {
        let sanitized = sanitize_tool_name("device", &tool.name);
        self.name_map.write().await.insert(sanitized.clone(), tool.name.clone());
        let mut def = ToolDefinition::new(sanitized);
        if let Some(desc) = tool.description {
            def = def.with_description(desc);
        }
        if let Some(schema) = tool.input_schema {
            def = def.with_parameters(schema);
        }
        self.tools.write().await.push(def);
    }

    /// Replace any original tool names appearing in tool descriptions with
    /// their sanitized form, so the LLM only ever sees sanitized identifiers.
    async fn rewrite_descriptions_with_sanitized_names(&self) {
        let name_map = self.name_map.read().await.clone();
        let mut tools = self.tools.write().await;
        for tool in tools.iter_mut() {
            let Some(description) = &tool.description else { continue };
            let mut rewritten = description.clone();
            for (sanitized, original) in &name_map {
                rewritten = rewritten.replace(original.as_str(), sanitized.as_str());
            }
            tool.description = Some(rewritten);
        }
    }

    /// Call a device tool by its sanitized name and wait up to
    /// `DEFAULT_CALL_TIMEOUT` for the device's response.
    pub async fn call_tool(&self, sanitized_name: &str, arguments: HashMap<String, Value>) -> Result<ToolResult, McpError> {
        if !self.is_ready().await {
            return Err(McpError::Transport("device MCP client not ready".to_string()));
        }
        let original_name = self
            .name_map
            .read()
            .await
            .get(sanitized_name)
            .cloned()
            .ok_or_else(|| McpError::ToolNotFound(sanitized_name.to_string()))?;

        let id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
        let params = json!({"name": original_name, "arguments": arguments});
        let result = self.request(id, "tools/call", Some(params)).await?;
        let outcome: ToolCallOutcome = serde_json::from_value(result)?;

        Ok(if outcome.is_error {
            ToolResult::error(outcome.text())
        } else {
            ToolResult::req_llm(outcome.text())
        })
    }

    /// Register a pending call, send it, and await the correlated response.
    async fn request(&self, id: u64, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let payload = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params.unwrap_or_else(|| json!({}))});
        if let Err(e) = self.transport.send_json(payload).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(DEFAULT_CALL_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::Protocol("pending call sender dropped".to_string())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout)
            }
        }
    }

    /// Feed one inbound `type: "mcp"` payload from the device into the
    /// pending-call table. `result`/`error` messages resolve a pending
    /// request by id; `method` messages (requests from the device) are
    /// logged and otherwise ignored.
    pub async fn handle_message(&self, payload: Value) {
        if let Some(result) = payload.get("result").cloned() {
            let id = payload.get("id").and_then(Value::as_u64).unwrap_or(0);
            self.resolve(id, Ok(result)).await;
            return;
        }
        if let Some(error) = payload.get("error") {
            let id = payload.get("id").and_then(Value::as_u64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            self.resolve(id, Err(McpError::Protocol(format!("device MCP error: {message}")))).await;
            return;
        }
        if let Some(method) = payload.get("method").and_then(Value::as_str) {
            tracing::info!(method, "received MCP request from device, ignoring");
        }
    }

    async fn resolve(&self, id: u64, result: Result<Value, McpError>) {
        if let Some(tx) = self.pending.lock().await.remove(&id) {
            let _ = tx.send(result);
        }
    }
}

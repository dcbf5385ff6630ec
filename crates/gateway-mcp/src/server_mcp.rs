//! `server_mcp`: JSON-RPC MCP clients hosted alongside the gateway, reached
//! over stdio, SSE, or streamable HTTP (per server config).
//!
//! `dispatch` retries up to 3x with a 2s backoff, reconnecting the
//! underlying client between attempts — grounded in the retry/reconnect
//! loop of the original server-MCP manager.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use gateway_core::{ToolDefinition, ToolResult};

use crate::error::McpError;
use crate::http_client::{HttpClient, HttpConfig};
use crate::stdio_client::{StdioClient, StdioConfig};
use crate::types::McpTool;

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

pub enum ServerTransportConfig {
    Stdio(StdioConfig),
    Http(HttpConfig),
}

enum Transport {
    Stdio(StdioClient),
    Http(HttpClient),
}

impl Transport {
    async fn connect(config: &ServerTransportConfig) -> Result<Self, McpError> {
        match config {
            ServerTransportConfig::Stdio(cfg) => {
                let mut client = StdioClient::new();
                client.connect(cfg).await?;
                Ok(Self::Stdio(client))
            }
            ServerTransportConfig::Http(cfg) => {
                let client = HttpClient::new(cfg.clone())?;
                client.connect().await?;
                Ok(Self::Http(client))
            }
        }
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        match self {
            Self::Stdio(c) => c.list_tools().await,
            Self::Http(c) => c.list_tools().await,
        }
    }

    async fn call_tool(&self, name: &str, arguments: HashMap<String, Value>) -> Result<String, McpError> {
        match self {
            Self::Stdio(c) => c.call_tool(name, arguments).await.map(|o| (o.is_error, o.text())).map(outcome_to_result),
            Self::Http(c) => c.call_tool(name, arguments).await.map(|o| (o.is_error, o.text())).map(outcome_to_result),
        }
    }
}

fn outcome_to_result((is_error, text): (bool, String)) -> String {
    if is_error {
        format!("ERROR:{text}")
    } else {
        text
    }
}

/// Sanitizes a raw MCP tool name to the `^[a-zA-Z0-9_-]{1,64}$` shape the
/// LLM's function-calling wire format requires, prefixed with the owning
/// server's slug so identically-named tools from different servers don't
/// collide.
#[must_use]
pub fn sanitize_tool_name(server_slug: &str, original: &str) -> String {
    let raw = format!("{server_slug}_{original}");
    let sanitized: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    sanitized.chars().take(64).collect()
}

/// One server-hosted MCP connection, with sanitized names exposed to the
/// rest of the registry and a `name_map` resolving back to the originals.
pub struct ServerMcpClient {
    slug: String,
    transport_config: ServerTransportConfig,
    transport: Mutex<Option<Transport>>,
    name_map: RwLock<HashMap<String, String>>,
    tools: RwLock<Vec<ToolDefinition>>,
}

impl ServerMcpClient {
    #[must_use]
    pub fn new(slug: impl Into<String>, transport_config: ServerTransportConfig) -> Self {
        Self {
            slug: slug.into(),
            transport_config,
            transport: Mutex::new(None),
            name_map: RwLock::new(HashMap::new()),
            tools: RwLock::new(Vec::new()),
        }
    }

    /// Connect and populate `tools`/`name_map` from `tools/list`.
    pub async fn initialize(&self) -> Result<(), McpError> {
        let transport = Transport::connect(&self.transport_config).await?;
        let raw_tools = transport.list_tools().await?;

        let mut name_map = HashMap::new();
        let mut tools = Vec::new();
        for tool in raw_tools {
            let sanitized = sanitize_tool_name(&self.slug, &tool.name);
            name_map.insert(sanitized.clone(), tool.name.clone());
            let mut def = ToolDefinition::new(sanitized);
            if let Some(desc) = tool.description {
                def = def.with_description(desc);
            }
            if let Some(schema) = tool.input_schema {
                def = def.with_parameters(schema);
            }
            tools.push(def);
        }

        *self.name_map.write().await = name_map;
        *self.tools.write().await = tools;
        *self.transport.lock().await = Some(transport);
        Ok(())
    }

    pub async fn has_tool(&self, sanitized_name: &str) -> bool {
        self.name_map.read().await.contains_key(sanitized_name)
    }

    pub async fn tools(&self) -> Vec<ToolDefinition> {
        self.tools.read().await.clone()
    }

    async fn reconnect(&self) -> Result<(), McpError> {
        *self.transport.lock().await = None;
        self.initialize().await
    }

    /// Dispatch one call by its sanitized name, retrying with reconnect on
    /// failure up to `MAX_RETRIES` times.
    pub async fn dispatch(&self, sanitized_name: &str, arguments: HashMap<String, Value>) -> Result<ToolResult, McpError> {
        let original_name = self
            .name_map
            .read()
            .await
            .get(sanitized_name)
            .cloned()
            .ok_or_else(|| McpError::ToolNotFound(sanitized_name.to_string()))?;

        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            let call_result = {
                let guard = self.transport.lock().await;
                match guard.as_ref() {
                    Some(transport) => transport.call_tool(&original_name, arguments.clone()).await,
                    None => Err(McpError::Transport("not connected".to_string())),
                }
            };

            match call_result {
                Ok(text) => {
                    return Ok(if let Some(message) = text.strip_prefix("ERROR:") {
                        ToolResult::error(message.to_string())
                    } else {
                        ToolResult::req_llm(text)
                    });
                }
                Err(e) => {
                    tracing::warn!(tool = sanitized_name, attempt, error = %e, "server MCP call failed");
                    last_err = Some(e);
                    if attempt + 1 < MAX_RETRIES {
                        if let Err(reconnect_err) = self.reconnect().await {
                            tracing::error!(server = %self.slug, error = %reconnect_err, "failed to reconnect MCP client");
                        }
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        Err(McpError::RetriesExhausted(last_err.map(|e| e.to_string()).unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_tool_name_prefixes_with_server_slug_and_replaces_invalid_chars() {
        assert_eq!(sanitize_tool_name("weather-api", "get.forecast"), "weather-api_get_forecast");
    }

    #[test]
    fn sanitize_tool_name_truncates_to_64_chars() {
        let long = "x".repeat(100);
        let sanitized = sanitize_tool_name("s", &long);
        assert_eq!(sanitized.len(), 64);
    }
}

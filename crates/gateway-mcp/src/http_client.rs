//! MCP JSON-RPC client over HTTP (SSE or streamable-HTTP server configs).
//!
//! Each call is a single POST carrying a JSON-RPC envelope; the response
//! body is parsed as one JSON-RPC response object. Legacy `API_ACCESS_TOKEN`
//! configs are promoted to `Authorization: Bearer …`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::McpError;
use crate::types::{McpTool, ToolCallOutcome, ToolsListPage};

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Promoted from the legacy `API_ACCESS_TOKEN` setting, if present.
    pub legacy_access_token: Option<String>,
}

pub struct HttpClient {
    client: reqwest::Client,
    config: HttpConfig,
    request_id: AtomicU64,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, McpError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::Transport(e.to_string()))?;
        Ok(Self { client, config, request_id: AtomicU64::new(1) })
    }

    pub async fn connect(&self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": "2024-11-05",
            "clientInfo": {"name": "gateway", "version": env!("CARGO_PKG_VERSION")},
            "capabilities": {}
        });
        let _: Value = self.request("initialize", Some(params)).await?;
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({"cursor": c}));
            let page: ToolsListPage = self.request("tools/list", params).await?;
            all.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(all)
    }

    pub async fn call_tool(&self, name: &str, arguments: HashMap<String, Value>) -> Result<ToolCallOutcome, McpError> {
        let params = json!({"name": name, "arguments": arguments});
        self.request("tools/call", Some(params)).await
    }

    fn build_headers(&self) -> Result<HeaderMap, McpError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.config.headers {
            let name = HeaderName::try_from(key.as_str()).map_err(|e| McpError::Transport(e.to_string()))?;
            let value = HeaderValue::try_from(value.as_str()).map_err(|e| McpError::Transport(e.to_string()))?;
            headers.insert(name, value);
        }
        if !headers.contains_key(AUTHORIZATION) {
            if let Some(token) = &self.config.legacy_access_token {
                tracing::warn!("promoting legacy API_ACCESS_TOKEN to Authorization: Bearer");
                let value = HeaderValue::try_from(format!("Bearer {token}")).map_err(|e| McpError::Transport(e.to_string()))?;
                headers.insert(AUTHORIZATION, value);
            }
        }
        Ok(headers)
    }

    async fn request<T: for<'de> Deserialize<'de>>(&self, method: &str, params: Option<Value>) -> Result<T, McpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params.unwrap_or_else(|| json!({}))});

        let response = self
            .client
            .post(&self.config.url)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!("upstream returned {status}: {text}")));
        }

        let rpc: JsonRpcResponse = response.json().await.map_err(|e| McpError::Protocol(e.to_string()))?;
        if let Some(err) = rpc.error {
            return Err(McpError::ServerError { code: err.code, message: err.message });
        }
        let result = rpc.result.ok_or_else(|| McpError::Protocol("missing result".into()))?;
        Ok(serde_json::from_value(result)?)
    }
}

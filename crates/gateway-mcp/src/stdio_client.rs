//! MCP JSON-RPC client over stdio (one child process per server config).
//!
//! Reference: <https://spec.modelcontextprotocol.io/>

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::McpError;
use crate::path;
use crate::types::{McpTool, ToolCallOutcome, ToolsListPage};

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    id: Option<u64>,
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

pub struct StdioConfig {
    pub exe_path: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub path_extra: Option<String>,
    pub env: Vec<(String, String)>,
}

/// One stdio-spawned MCP server connection.
pub struct StdioClient {
    process: Option<Child>,
    stdin: Option<Arc<std::sync::Mutex<ChildStdin>>>,
    stdout_reader: Option<Arc<Mutex<BufReader<ChildStdout>>>>,
    request_id: AtomicU64,
}

impl StdioClient {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            process: None,
            stdin: None,
            stdout_reader: None,
            request_id: AtomicU64::new(1),
        }
    }

    pub async fn connect(&mut self, config: &StdioConfig) -> Result<(), McpError> {
        path::validate_exe_path(&config.exe_path).map_err(McpError::SpawnFailed)?;
        if let Some(cwd) = &config.cwd {
            path::validate_working_dir(cwd).map_err(McpError::SpawnFailed)?;
        }
        let effective_path = path::build_effective_path(&config.exe_path, config.path_extra.as_deref());

        let mut command = std::process::Command::new(&config.exe_path);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PATH", &effective_path);
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| McpError::SpawnFailed(format!("failed to spawn '{}': {e}", config.exe_path)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to get stdout".to_string()))?;

        self.process = Some(child);
        self.stdin = Some(Arc::new(std::sync::Mutex::new(stdin)));
        self.stdout_reader = Some(Arc::new(Mutex::new(BufReader::new(stdout))));

        let params = json!({
            "protocolVersion": "2024-11-05",
            "clientInfo": {"name": "gateway", "version": env!("CARGO_PKG_VERSION")},
            "capabilities": {}
        });
        let _: Value = self.request("initialize", Some(params)).await?;
        self.notify("notifications/initialized", None)?;
        Ok(())
    }

    /// List every tool across all `nextCursor` pages.
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

    async fn request<T: for<'de> Deserialize<'de>>(&self, method: &str, params: Option<Value>) -> Result<T, McpError> {
        let stdin = self.stdin.as_ref().ok_or_else(|| McpError::Transport("not connected".into()))?;
        let stdout_reader = self
            .stdout_reader
            .as_ref()
            .ok_or_else(|| McpError::Transport("not connected".into()))?;

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest { jsonrpc: "2.0", id, method: method.to_string(), params };
        let line = serde_json::to_string(&request)? + "\n";

        {
            let mut guard = stdin.lock().map_err(|_| McpError::Protocol("failed to lock stdin".into()))?;
            guard.write_all(line.as_bytes())?;
            guard.flush()?;
        }

        let read = timeout(Duration::from_secs(30), async {
            let mut reader = stdout_reader.lock().await;
            for _ in 0..10 {
                let mut raw = String::new();
                match reader.read_line(&mut raw) {
                    Ok(0) => return Err(McpError::Protocol("server closed stdout".into())),
                    Ok(_) => {
                        let trimmed = raw.trim();
                        if trimmed.is_empty() {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                        if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(trimmed) {
                            return Ok(response);
                        }
                        tracing::debug!(line = trimmed, "skipping non-JSON-RPC stdout output");
                    }
                    Err(e) => return Err(McpError::from(e)),
                }
            }
            Err(McpError::Protocol("no valid JSON-RPC response received".into()))
        })
        .await;

        let response = match read {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(McpError::Timeout),
        };

        if let Some(err) = response.error {
            return Err(McpError::ServerError { code: err.code, message: err.message });
        }
        let result = response.result.ok_or_else(|| McpError::Protocol("missing result".into()))?;
        Ok(serde_json::from_value(result)?)
    }

    fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let stdin = self.stdin.as_ref().ok_or_else(|| McpError::Transport("not connected".into()))?;
        let notification = json!({"jsonrpc": "2.0", "method": method, "params": params.unwrap_or_else(|| json!({}))});
        let line = serde_json::to_string(&notification)? + "\n";
        let mut guard = stdin.lock().map_err(|_| McpError::Protocol("failed to lock stdin".into()))?;
        guard.write_all(line.as_bytes())?;
        guard.flush()?;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.stdin = None;
        self.stdout_reader = None;
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

impl Default for StdioClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StdioClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_rpc_request_omits_params_when_none() {
        let request = JsonRpcRequest { jsonrpc: "2.0", id: 1, method: "tools/list".to_string(), params: None };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn json_rpc_error_response_parses() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request"}}"#;
        let response: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.error.unwrap().code, -32600);
    }
}

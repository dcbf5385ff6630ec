//! Wire-adjacent DTOs shared by the stdio and HTTP MCP transports.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition from an MCP server's `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

/// One page of `tools/list`.
#[derive(Debug, Default, Deserialize)]
pub struct ToolsListPage {
    #[serde(default)]
    pub tools: Vec<McpTool>,
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// Outcome of `tools/call`, in the device/server MCP wire shape:
/// `{content:[{text}], isError?, error?}`.
#[derive(Debug, Default, Deserialize)]
pub struct ToolCallOutcome {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentItem {
    #[serde(default)]
    pub text: Option<String>,
}

impl ToolCallOutcome {
    /// Flatten every content item's text into one string, joined on newlines.
    #[must_use]
    pub fn text(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        self.content
            .iter()
            .filter_map(|item| item.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

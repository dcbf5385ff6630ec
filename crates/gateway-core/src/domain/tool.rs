//! Tool-calling domain types shared by `ToolRegistry` and `TurnEngine`.

use serde::{Deserialize, Serialize};

/// An OpenAI-style function schema, as published to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ToolDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Disposition of a dispatched tool call.
///
/// `Response`/`NotFound`/`Error` are spoken directly and recorded as the
/// turn's outcome; `ReqLlm` feeds the result back into another LLM pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Response,
    ReqLlm,
    NotFound,
    Error,
}

/// Outcome of one `ToolRegistry::dispatch` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub action: Action,
    pub text: String,
}

impl ToolResult {
    #[must_use]
    pub fn response(text: impl Into<String>) -> Self {
        Self {
            action: Action::Response,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn req_llm(text: impl Into<String>) -> Self {
        Self {
            action: Action::ReqLlm,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self {
            action: Action::NotFound,
            text: format!("Tool not found: {name}"),
        }
    }

    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            action: Action::Error,
            text: text.into(),
        }
    }
}

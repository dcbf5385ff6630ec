//! Wire DTOs for the upstream OpenAI-compatible chat-completions endpoint.

use serde::{Deserialize, Serialize};

use gateway_core::{Message, MessageRole, ToolCallRef, ToolDefinition};

#[derive(Debug, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: role_str(message.role),
            content: message.content.clone().unwrap_or_default(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|t| WireToolCall {
                    id: t.id.clone(),
                    kind: "function",
                    function: WireFunctionCall {
                        name: t.name.clone(),
                        arguments: t.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

fn role_str(role: MessageRole) -> &'static str {
    role.as_str()
}

#[derive(Debug, Serialize)]
pub struct WireToolSchema<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: &'a ToolDefinition,
}

impl<'a> From<&'a ToolDefinition> for WireToolSchema<'a> {
    fn from(def: &'a ToolDefinition) -> Self {
        Self { kind: "function", function: def }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireToolSchema<'a>>>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ChunkToolCallDelta>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<ChunkFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

pub fn build_messages(dialogue: &[Message]) -> Vec<WireMessage> {
    dialogue.iter().map(WireMessage::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_content_serializes_as_empty_string_not_null() {
        let message = Message::tool("call-1", "");
        let wire = WireMessage::from(&message);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["content"], "");
    }

    #[test]
    fn assistant_tool_calls_round_trip_into_wire_shape() {
        let message = Message::assistant_tool_calls(vec![ToolCallRef {
            id: "call-1".to_string(),
            name: "get_weather".to_string(),
            arguments: "{\"city\":\"nyc\"}".to_string(),
        }]);
        let wire = WireMessage::from(&message);
        assert_eq!(wire.tool_calls.len(), 1);
        assert_eq!(wire.tool_calls[0].function.name, "get_weather");
    }

    #[test]
    fn chunk_with_absent_tool_calls_field_deserializes_to_empty_vec() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
        assert!(chunk.choices[0].delta.tool_calls.is_empty());
    }
}

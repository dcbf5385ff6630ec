//! Dialogue domain types.
//!
//! These types represent one connection's conversation history, independent
//! of any infrastructure concerns (LLM vendor wire format, storage, etc.).

use serde::{Deserialize, Serialize};

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tool call emitted by the assistant, recorded verbatim in the dialogue.
///
/// `arguments` is kept as the raw JSON text the LLM produced (possibly still
/// being accumulated mid-stream), not a parsed `Value` — dispatch is
/// responsible for parsing, and a malformed payload must not make the
/// dialogue itself unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One message in a conversation.
///
/// Appended, never mutated — except the system prompt slot, which is
/// replaced wholesale by [`DialogueStore::update_system`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    #[must_use]
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRef>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Content normalized for emission to the LLM: missing content becomes `""`.
    #[must_use]
    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Ordered conversation history for one connection.
///
/// Invariant: at most one system message, always at index 0.
#[derive(Debug, Clone, Default)]
pub struct DialogueStore {
    system: Option<String>,
    messages: Vec<Message>,
}

impl DialogueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. System messages must go through [`Self::update_system`].
    pub fn put(&mut self, message: Message) {
        debug_assert!(
            message.role != MessageRole::System,
            "system messages must be set via update_system"
        );
        self.messages.push(message);
    }

    /// Create or replace the system prompt slot.
    pub fn update_system(&mut self, prompt: impl Into<String>) {
        self.system = Some(prompt.into());
    }

    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system.as_deref()
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Build the linear message list sent to the LLM: system prompt (with an
    /// optional memory summary and voiceprint hint folded in, without
    /// mutating stored state) at index 0, followed by the stored history
    /// with missing `content` normalized to `""`.
    #[must_use]
    pub fn get_for_llm(
        &self,
        memory_summary: Option<&str>,
        voiceprint_hint: Option<&str>,
    ) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);

        let mut system_text = self.system.clone().unwrap_or_default();
        if let Some(summary) = memory_summary.filter(|s| !s.is_empty()) {
            system_text.push_str("\n\n");
            system_text.push_str(summary);
        }
        if let Some(hint) = voiceprint_hint.filter(|s| !s.is_empty()) {
            system_text.push_str("\n\n");
            system_text.push_str(hint);
        }
        if !system_text.is_empty() {
            out.push(Message::system(system_text));
        }

        for message in &self.messages {
            out.push(Message {
                role: message.role,
                content: Some(message.content_or_empty().to_string()),
                tool_calls: message.tool_calls.clone(),
                tool_call_id: message.tool_call_id.clone(),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_stays_at_logical_index_zero() {
        let mut store = DialogueStore::new();
        store.update_system("be helpful");
        store.put(Message::user("hi"));
        let for_llm = store.get_for_llm(None, None);
        assert_eq!(for_llm[0].role, MessageRole::System);
        assert_eq!(for_llm[0].content.as_deref(), Some("be helpful"));
    }

    #[test]
    fn update_system_replaces_rather_than_duplicates() {
        let mut store = DialogueStore::new();
        store.update_system("first");
        store.update_system("second");
        let for_llm = store.get_for_llm(None, None);
        assert_eq!(for_llm.iter().filter(|m| m.role == MessageRole::System).count(), 1);
        assert_eq!(for_llm[0].content.as_deref(), Some("second"));
    }

    #[test]
    fn memory_summary_and_voiceprint_are_folded_into_system_without_mutating_store() {
        let mut store = DialogueStore::new();
        store.update_system("base");
        let for_llm = store.get_for_llm(Some("user likes tea"), Some("voice: alice"));
        assert!(for_llm[0].content.as_deref().unwrap().contains("base"));
        assert!(for_llm[0].content.as_deref().unwrap().contains("user likes tea"));
        assert!(for_llm[0].content.as_deref().unwrap().contains("voice: alice"));
        assert_eq!(store.system_prompt(), Some("base"));
    }

    #[test]
    fn missing_content_normalizes_to_empty_string() {
        let mut store = DialogueStore::new();
        store.put(Message {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: vec![ToolCallRef {
                id: "t1".into(),
                name: "search".into(),
                arguments: "{}".into(),
            }],
            tool_call_id: None,
        });
        let for_llm = store.get_for_llm(None, None);
        assert_eq!(for_llm[0].content.as_deref(), Some(""));
    }

    #[test]
    fn tool_call_round_trip_orders_assistant_then_tool_messages() {
        let mut store = DialogueStore::new();
        store.put(Message::user("x"));
        store.put(Message::assistant_tool_calls(vec![ToolCallRef {
            id: "t1".into(),
            name: "search_from_ragflow".into(),
            arguments: r#"{"question":"x"}"#.into(),
        }]));
        store.put(Message::tool("t1", "R"));
        store.put(Message::assistant("final answer"));

        let messages = store.messages();
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].tool_calls[0].id, "t1");
        assert_eq!(messages[2].role, MessageRole::Tool);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("t1"));
        assert_eq!(messages[3].role, MessageRole::Assistant);
    }
}

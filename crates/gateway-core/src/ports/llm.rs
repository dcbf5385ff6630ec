//! The `LLMEngine` port: a streaming chat-completions contract.
//!
//! Two streaming contracts per spec §4.6. Upstream protocol is assumed to be
//! streaming chat-completions with optional usage stats on terminal chunks;
//! numeric sampling parameters are omitted from the upstream request when
//! absent rather than defaulted.

use async_trait::async_trait;
use futures_core::stream::BoxStream;

use crate::domain::{Message, ToolDefinition};

/// One increment of a `stream_with_tools` response: either a content delta,
/// or a fragment of a structured tool call, keyed by `index` so fragments
/// for the same call (across chunks) can be merged.
#[derive(Debug, Clone, Default)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments_fragment: Option<String>,
}

#[derive(Debug, Clone)]
pub enum StreamItem {
    Content(String),
    ToolCall(ToolCallDelta),
}

/// Optional sampling parameters; any field left `None` is omitted from the
/// upstream request rather than defaulted.
#[derive(Debug, Clone, Default)]
pub struct SamplingParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm returned a malformed stream chunk: {0}")]
    MalformedChunk(String),
}

/// Streaming completion client.
///
/// `<think>…</think>` segments are suppressed by the implementation before
/// a `Content` item is ever yielded: the engine toggles an `active` flag on
/// tokens containing either tag and drops everything between them,
/// inclusive of the tags themselves.
#[async_trait]
pub trait LlmEngine: Send + Sync {
    /// Plain content-only stream (no tool-calling).
    async fn stream(
        &self,
        dialogue: &[Message],
        params: &SamplingParams,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError>;

    /// Content-and-tool-call stream, offered the given function schemas.
    /// Passing an empty `tools` slice is equivalent to `stream` but still
    /// goes through the tool-calling wire shape (callers needing a bare
    /// content stream should call `stream` directly).
    async fn stream_with_tools(
        &self,
        dialogue: &[Message],
        tools: &[ToolDefinition],
        params: &SamplingParams,
    ) -> Result<BoxStream<'static, Result<StreamItem, LlmError>>, LlmError>;
}

/// Strips `<think>...</think>` spans from a raw upstream token, carrying
/// `active` state across calls for tags split across chunk boundaries.
///
/// Grounded in spec §4.6: "the engine toggles an `active` flag on tokens
/// containing either tag; anything between tags is dropped, inclusive."
#[derive(Debug, Default)]
pub struct ThinkTagFilter {
    active: bool,
}

impl ThinkTagFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw token, returning the visible (non-think) portion.
    pub fn filter(&mut self, token: &str) -> String {
        const OPEN: &str = "<think>";
        const CLOSE: &str = "</think>";
        let mut out = String::new();
        let mut rest = token;
        loop {
            if self.active {
                match rest.find(CLOSE) {
                    Some(pos) => {
                        self.active = false;
                        rest = &rest[pos + CLOSE.len()..];
                    }
                    None => return out,
                }
            } else {
                match rest.find(OPEN) {
                    Some(pos) => {
                        out.push_str(&rest[..pos]);
                        self.active = true;
                        rest = &rest[pos + OPEN.len()..];
                    }
                    None => {
                        out.push_str(rest);
                        return out;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_plain_tokens() {
        let mut filter = ThinkTagFilter::new();
        assert_eq!(filter.filter("hello "), "hello ");
        assert_eq!(filter.filter("world"), "world");
    }

    #[test]
    fn drops_a_think_span_within_one_token() {
        let mut filter = ThinkTagFilter::new();
        assert_eq!(filter.filter("before<think>reasoning</think>after"), "beforeafter");
    }

    #[test]
    fn drops_a_think_span_split_across_tokens() {
        let mut filter = ThinkTagFilter::new();
        assert_eq!(filter.filter("before<think>reasoning"), "before");
        assert_eq!(filter.filter(" more reasoning"), "");
        assert_eq!(filter.filter("</think>after"), "after");
    }
}

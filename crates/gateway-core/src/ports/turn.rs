//! Ports `TurnEngine` calls through: the text side of TTS egress, the
//! optional memory summary lookup, and the fire-and-forget emotion hook.
//! Concrete wiring (the actual TTS session, vector-memory store, emotion
//! classifier) lives in `gateway-voice`/`gateway-server` adapters.

use async_trait::async_trait;

/// Where a turn's assistant text goes before it becomes audio.
///
/// `TurnEngine` drives the FIRST/MIDDLE*/LAST envelope described in §4.8;
/// the sink only needs to forward text into whatever TTS session is open
/// for `sentence_id`.
#[async_trait]
pub trait TtsTextSink: Send + Sync {
    async fn send_first(&self, sentence_id: &str);
    async fn send_text(&self, sentence_id: &str, chunk: &str);
    async fn send_last(&self, sentence_id: &str);
}

/// Optional memory summary lookup, queried once per turn before the LLM
/// call and folded into the system prompt.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn query_memory(&self, query: &str) -> Option<String>;

    /// Opaque save-on-close hook: offered the connection's final dialogue
    /// once, when it ends. A no-op by default — persistence semantics
    /// beyond that single hand-off are up to the implementation.
    async fn persist(&self, _messages: &[crate::domain::Message]) {}
}

/// Fire-and-forget emotion extraction, triggered once on the first
/// non-empty content delta of a turn.
#[async_trait]
pub trait EmotionHook: Send + Sync {
    async fn extract(&self, content: &str);
}

//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from
//! infrastructure. They contain no implementation details and use only
//! domain types — no vendor SDK types, no socket types.

pub mod llm;
pub mod tool;
pub mod turn;
pub mod voice;

pub use llm::{LlmEngine, LlmError, SamplingParams, StreamItem, ThinkTagFilter, ToolCallDelta};
pub use tool::ToolDispatcher;
pub use turn::{EmotionHook, MemoryStore, TtsTextSink};
pub use voice::{
    AsrHypothesis, AsrProvider, AsrProviderSession, TtsEvent, TtsProvider, TtsProviderSession,
    VadProvider, VoiceProviderError,
};

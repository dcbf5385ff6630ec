//! OpenAI-compatible streaming chat-completions [`LlmEngine`](gateway_core::LlmEngine) adapter.

pub mod openai_engine;
pub mod sse;
pub mod wire;

pub use openai_engine::{OpenAiConfig, OpenAiEngine};

#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod error;
pub mod ports;

pub use domain::{
    Action, AsrConfig, AudioRouterConfig, AuthConfig, AuthVerifier, ConnectionConfig,
    DialogueStore, EndPromptConfig, GatewayConfig, McpConfig, Message, MessageRole, OverflowPolicy,
    PacedSenderConfig, ToolCallRef, ToolDefinition, ToolResult, TurnEngineConfig, VadConfig,
};
pub use error::GatewayError;
pub use ports::{
    AsrHypothesis, AsrProvider, AsrProviderSession, EmotionHook, LlmEngine, LlmError, MemoryStore,
    SamplingParams, StreamItem, ThinkTagFilter, ToolCallDelta, ToolDispatcher, TtsEvent,
    TtsProvider, TtsProviderSession, TtsTextSink, VadProvider, VoiceProviderError,
};

#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;

//! `TurnEngine` error type.

#[derive(Debug, thiserror::Error)]
pub enum TurnEngineError {
    #[error("llm error: {0}")]
    Llm(#[from] gateway_core::LlmError),
}

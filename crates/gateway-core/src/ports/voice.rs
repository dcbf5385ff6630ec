//! Provider ports for VAD, ASR and TTS vendor adapters.
//!
//! Concrete vendor adapters (a cloud ASR websocket, a local VAD model, …)
//! are out of scope for this specification — only their contract is
//! specified here. `gateway-voice` implements the session state machines
//! (`ASRSession`, `TTSSession`, `VADGate`) against these ports.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceProviderError {
    #[error("provider connect failed: {0}")]
    ConnectFailed(String),
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider closed the stream: code={code}")]
    ClosedWithCode { code: i32 },
}

/// Voice-activity classifier. Reentrant: shared instances may be called
/// concurrently from multiple connections, each call self-contained.
pub trait VadProvider: Send + Sync {
    /// Classify one PCM16 mono frame as voice (`true`) or silence (`false`).
    fn is_speech(&self, pcm_frame: &[i16]) -> bool;
}

/// A streaming hypothesis delivered by the ASR upstream.
#[derive(Debug, Clone)]
pub struct AsrHypothesis {
    pub text: String,
    pub is_final: bool,
}

/// One open upstream ASR connection for a single speech turn.
#[async_trait]
pub trait AsrProviderSession: Send {
    /// Send the first audio chunk of the turn, opening the upstream if
    /// necessary.
    async fn send_first(&mut self, pcm: &[i16]) -> Result<(), VoiceProviderError>;
    /// Send a subsequent chunk.
    async fn send_continue(&mut self, pcm: &[i16]) -> Result<(), VoiceProviderError>;
    /// Signal end-of-turn and await the final hypothesis (bounded by the
    /// caller's own timeout).
    async fn send_last(&mut self) -> Result<(), VoiceProviderError>;
    /// Poll for the next hypothesis, partial or final.
    async fn next_hypothesis(&mut self) -> Result<Option<AsrHypothesis>, VoiceProviderError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait AsrProvider: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn AsrProviderSession>, VoiceProviderError>;
}

/// Sentence-boundary / lifecycle event surfaced by a TTS upstream, mapped
/// onto the shared model described in spec §4.9.
#[derive(Debug, Clone)]
pub enum TtsEvent {
    SynthesisStarted,
    /// Flushes the last assembled sentence caption, if any.
    SentenceEnd { caption: Option<String> },
    /// Raw PCM audio ready to be opus-encoded by the session.
    AudioChunk(Vec<i16>),
    TaskFinished,
    TaskFailed(String),
}

#[async_trait]
pub trait TtsProviderSession: Send {
    async fn start(&mut self, session_id: &str) -> Result<(), VoiceProviderError>;
    async fn send_text(&mut self, chunk: &str) -> Result<(), VoiceProviderError>;
    async fn finish(&mut self) -> Result<(), VoiceProviderError>;
    /// Poll the background monitor for the next event.
    async fn next_event(&mut self) -> Result<Option<TtsEvent>, VoiceProviderError>;
    /// Whether the upstream has been idle long enough that the session
    /// should be reconnected rather than reused for the next `start`.
    fn is_expired(&self) -> bool;
}

#[async_trait]
pub trait TtsProvider: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn TtsProviderSession>, VoiceProviderError>;
}

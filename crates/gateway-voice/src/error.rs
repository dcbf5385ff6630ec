//! Voice pipeline error types.

use gateway_core::VoiceProviderError;

/// Errors raised by the voice pipeline components (`AudioFrameRouter`,
/// `VADGate`, `ASRSession`, `TTSSession`, `PacedSender`).
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Opus encode/decode failure.
    #[error("opus codec error: {0}")]
    Codec(String),

    /// ASR/TTS vendor provider failure.
    #[error(transparent)]
    Provider(#[from] VoiceProviderError),

    /// ASR upstream is unavailable (connect failed).
    #[error("ASR unavailable: {0}")]
    AsrUnavailable(String),

    /// Operation attempted while the session was in the wrong state.
    #[error("invalid session state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// `DeviceSink` delivery failure — the device socket closed or errored.
    #[error("device transport error: {0}")]
    Transport(String),
}

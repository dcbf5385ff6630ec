//! Voice pipeline: audio framing, VAD hysteresis, ASR session state
//! machine, TTS session management, and real-time egress pacing.

pub mod audio_frame;
pub mod asr_session;
pub mod error;
pub mod opus_codec;
pub mod paced_sender;
pub mod tts_session;
pub mod vad_gate;

pub use asr_session::{AsrSession, AsrState, HypothesisMerger};
pub use audio_frame::{wrap_egress_frame, FrameHeader, ReorderBuffer};
pub use error::VoiceError;
pub use opus_codec::{OpusDecoderWrapper, OpusEncoderWrapper, SAMPLES_PER_FRAME};
pub use paced_sender::{DeviceSink, PacedSender};
pub use tts_session::{SentenceMarker, TtsFrame, TtsSession};
pub use vad_gate::{ListenMode, VadDecision, VadGate};

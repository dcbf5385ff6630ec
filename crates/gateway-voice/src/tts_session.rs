//! `TTSSession` — per-connection duplex synthesizer session.
//!
//! Wraps a vendor [`TtsProviderSession`] in the three-phase contract
//! (`start`/`send_text`/`finish`) described in spec §4.9, re-encoding
//! incoming PCM to opus and pushing framed output — paired with
//! sentence-boundary markers — onto an egress channel that `PacedSender`
//! drains.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use uuid::Uuid;

use gateway_core::{TtsEvent as ProviderTtsEvent, TtsProvider, TtsProviderSession};

use crate::error::VoiceError;
use crate::opus_codec::OpusEncoderWrapper;

/// Sentence-boundary envelope carried alongside an egress opus frame, or on
/// its own when a sentence boundary has no accompanying audio.
#[derive(Debug, Clone)]
pub enum SentenceMarker {
    First,
    /// `caption` flushes the last assembled sentence's text, if any.
    SentenceEnd { caption: Option<String> },
    Last,
}

#[derive(Debug, Clone)]
pub struct TtsFrame {
    pub sentence_id: Uuid,
    pub opus: Vec<u8>,
}

const IDLE_REUSE_WINDOW: Duration = Duration::from_secs(60);

/// Owns one upstream TTS connection, reused across sentences while it
/// stays within the vendor's idle window.
pub struct TtsSession {
    provider: Arc<dyn TtsProvider>,
    upstream: Option<Box<dyn TtsProviderSession>>,
    sentence_id: Option<Uuid>,
    last_active: Instant,
    encoder: OpusEncoderWrapper,
    frame_tx: mpsc::Sender<TtsFrame>,
    marker_tx: mpsc::Sender<SentenceMarker>,
}

impl TtsSession {
    pub fn new(
        provider: Arc<dyn TtsProvider>,
        frame_tx: mpsc::Sender<TtsFrame>,
        marker_tx: mpsc::Sender<SentenceMarker>,
    ) -> Result<Self, VoiceError> {
        Ok(Self {
            provider,
            upstream: None,
            sentence_id: None,
            last_active: Instant::now(),
            encoder: OpusEncoderWrapper::new()?,
            frame_tx,
            marker_tx,
        })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.sentence_id.is_some()
    }

    fn idle_too_long(&self) -> bool {
        self.last_active.elapsed() > IDLE_REUSE_WINDOW
    }

    /// Begin a new sentence. If a session is already active (start called
    /// while the monitor is still running) it is forcibly closed first.
    pub async fn start(&mut self) -> Result<Uuid, VoiceError> {
        if self.upstream.is_some() && (self.is_active() || self.idle_too_long()) {
            if let Some(mut old) = self.upstream.take() {
                let _ = old.finish().await;
            }
        }
        if self.upstream.is_none() {
            self.upstream = Some(self.provider.open_session().await?);
        }

        let sentence_id = Uuid::new_v4();
        self.sentence_id = Some(sentence_id);
        self.last_active = Instant::now();

        let session = self.upstream.as_mut().expect("just ensured upstream is Some");
        session.start(&sentence_id.to_string()).await?;
        let _ = self.marker_tx.try_send(SentenceMarker::First);
        Ok(sentence_id)
    }

    pub async fn send_text(&mut self, chunk: &str) -> Result<(), VoiceError> {
        let Some(session) = self.upstream.as_mut() else {
            return Err(VoiceError::InvalidState {
                expected: "active",
                actual: "no upstream",
            });
        };
        session.send_text(chunk).await?;
        self.last_active = Instant::now();
        Ok(())
    }

    pub async fn finish(&mut self) -> Result<(), VoiceError> {
        let Some(session) = self.upstream.as_mut() else {
            return Ok(());
        };
        session.finish().await?;
        Ok(())
    }

    /// Drain one event from the upstream monitor, translating it into
    /// egress frames/markers. Returns `true` when the session has fully
    /// finished (`task_finished`) and is ready for the next `start`.
    pub async fn poll_once(&mut self) -> Result<bool, VoiceError> {
        let Some(sentence_id) = self.sentence_id else {
            return Ok(true);
        };
        let Some(session) = self.upstream.as_mut() else {
            return Ok(true);
        };

        match session.next_event().await? {
            Some(ProviderTtsEvent::SynthesisStarted) => Ok(false),
            Some(ProviderTtsEvent::SentenceEnd { caption }) => {
                let _ = self.marker_tx.try_send(SentenceMarker::SentenceEnd { caption });
                Ok(false)
            }
            Some(ProviderTtsEvent::AudioChunk(pcm)) => {
                let opus = self.encoder.encode(&pcm)?;
                let _ = self.frame_tx.try_send(TtsFrame { sentence_id, opus });
                self.last_active = Instant::now();
                Ok(false)
            }
            Some(ProviderTtsEvent::TaskFinished) => {
                let _ = self.marker_tx.try_send(SentenceMarker::Last);
                self.sentence_id = None;
                Ok(true)
            }
            Some(ProviderTtsEvent::TaskFailed(message)) => {
                tracing::warn!(%message, "tts task failed");
                self.sentence_id = None;
                Ok(true)
            }
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::VoiceProviderError;
    use std::sync::Mutex;

    struct FakeTtsSession {
        events: Mutex<Vec<ProviderTtsEvent>>,
    }

    #[async_trait]
    impl TtsProviderSession for FakeTtsSession {
        async fn start(&mut self, _session_id: &str) -> Result<(), VoiceProviderError> {
            Ok(())
        }
        async fn send_text(&mut self, _chunk: &str) -> Result<(), VoiceProviderError> {
            Ok(())
        }
        async fn finish(&mut self) -> Result<(), VoiceProviderError> {
            Ok(())
        }
        async fn next_event(&mut self) -> Result<Option<ProviderTtsEvent>, VoiceProviderError> {
            Ok(self.events.lock().unwrap().pop())
        }
        fn is_expired(&self) -> bool {
            false
        }
    }

    struct FakeTtsProvider;

    #[async_trait]
    impl TtsProvider for FakeTtsProvider {
        async fn open_session(&self) -> Result<Box<dyn TtsProviderSession>, VoiceProviderError> {
            Ok(Box::new(FakeTtsSession {
                events: Mutex::new(vec![
                    ProviderTtsEvent::TaskFinished,
                    ProviderTtsEvent::AudioChunk(vec![0; 960]),
                    ProviderTtsEvent::SynthesisStarted,
                ]),
            }))
        }
    }

    #[tokio::test]
    async fn start_assigns_a_fresh_sentence_id_each_time() {
        let (frame_tx, _frame_rx) = mpsc::channel(8);
        let (marker_tx, _marker_rx) = mpsc::channel(8);
        let mut session = TtsSession::new(Arc::new(FakeTtsProvider), frame_tx, marker_tx).unwrap();
        let first = session.start().await.unwrap();
        session.finish().await.unwrap();
        let second = session.start().await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn poll_once_encodes_audio_chunks_and_signals_completion_on_task_finished() {
        let (frame_tx, mut frame_rx) = mpsc::channel(8);
        let (marker_tx, _marker_rx) = mpsc::channel(8);
        let mut session = TtsSession::new(Arc::new(FakeTtsProvider), frame_tx, marker_tx).unwrap();
        session.start().await.unwrap();

        assert!(!session.poll_once().await.unwrap());
        assert!(!session.poll_once().await.unwrap());
        assert!(session.poll_once().await.unwrap());

        let frame = frame_rx.recv().await.unwrap();
        assert!(!frame.opus.is_empty());
    }
}

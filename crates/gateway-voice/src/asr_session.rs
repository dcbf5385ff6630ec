//! `ASRSession` — per-connection streaming recognizer state machine.
//!
//! `IDLE -> STREAMING -> CLOSING -> IDLE`. One upstream connection is opened
//! per speech turn; on silence resolution the session sends a final frame,
//! waits briefly for the last hypothesis, and reports the merged transcript
//! to the caller (`TurnEngine`, via `ConnectionHandler`).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use gateway_core::{AsrConfig, AsrProvider, AsrProviderSession, VoiceProviderError};

use crate::error::VoiceError;

const CLOSE_IMMEDIATELY_CODES: &[i32] = &[10114, 10160];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsrState {
    Idle,
    Streaming,
    Closing,
}

/// Tracks the "longest meaningful partial, then latest non-empty, with a
/// punctuation-append special case" merge rule from spec §4.4.
#[derive(Debug, Default)]
pub struct HypothesisMerger {
    best: String,
    after_last: bool,
}

fn is_pure_punctuation(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_punctuation())
}

impl HypothesisMerger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_last_sent(&mut self) {
        self.after_last = true;
    }

    /// Feed one hypothesis (partial or final). Returns `false` if the
    /// hypothesis was rejected (empty string arriving after LAST).
    pub fn ingest(&mut self, incoming: &str) -> bool {
        if self.after_last {
            if incoming.is_empty() {
                return false;
            }
            if is_pure_punctuation(incoming) && !self.best.is_empty() {
                if self.best.ends_with('.') && incoming.starts_with('.') {
                    self.best.pop();
                }
                self.best.push_str(incoming);
            } else {
                self.best = incoming.to_string();
            }
        } else if incoming.len() > self.best.len() {
            self.best = incoming.to_string();
        }
        true
    }

    #[must_use]
    pub fn best(&self) -> &str {
        &self.best
    }
}

pub struct AsrSession {
    provider: Arc<dyn AsrProvider>,
    upstream: Option<Box<dyn AsrProviderSession>>,
    state: AsrState,
    /// Rolling cache of recent frames, replayed as CONTINUE right after the
    /// upstream opens so the ASR sees audio leading into the detected voice.
    cached_frames: VecDeque<Vec<i16>>,
    config: AsrConfig,
    merger: HypothesisMerger,
}

impl AsrSession {
    #[must_use]
    pub fn new(provider: Arc<dyn AsrProvider>, config: AsrConfig) -> Self {
        Self {
            provider,
            upstream: None,
            state: AsrState::Idle,
            cached_frames: VecDeque::with_capacity(config.replay_cache_frames + 1),
            config,
            merger: HypothesisMerger::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> AsrState {
        self.state
    }

    fn remember(&mut self, pcm: &[i16]) {
        if self.cached_frames.len() == self.config.replay_cache_frames {
            self.cached_frames.pop_front();
        }
        self.cached_frames.push_back(pcm.to_vec());
    }

    /// Buffers a frame the caller decoded but did not feed (silence ahead of
    /// voice onset, or pre-`listen start` audio in manual mode) into the
    /// pre-roll cache, so the first `on_voice_frame` of the next turn has
    /// context to replay as CONTINUE (spec §4.4). A no-op once a session is
    /// already open — `on_voice_frame` owns the cache from that point.
    pub fn prime(&mut self, pcm: &[i16]) {
        if self.state == AsrState::Idle {
            self.remember(pcm);
        }
    }

    /// Handle one inbound voice frame, opening the upstream on the first
    /// frame of a turn.
    pub async fn on_voice_frame(&mut self, pcm: &[i16]) -> Result<(), VoiceError> {
        match self.state {
            AsrState::Idle => {
                let mut session = self
                    .provider
                    .open_session()
                    .await
                    .map_err(|e| VoiceError::AsrUnavailable(e.to_string()))?;
                session.send_first(pcm).await?;
                let replay: Vec<Vec<i16>> = self.cached_frames.iter().cloned().collect();
                for cached in &replay {
                    session.send_continue(cached).await?;
                }
                self.upstream = Some(session);
                self.state = AsrState::Streaming;
                self.remember(pcm);
                Ok(())
            }
            AsrState::Streaming => {
                self.remember(pcm);
                let Some(session) = self.upstream.as_mut() else {
                    return Ok(());
                };
                match session.send_continue(pcm).await {
                    Ok(()) => Ok(()),
                    Err(err) => self.handle_upstream_error(err).await,
                }
            }
            AsrState::Closing => Ok(()),
        }
    }

    async fn handle_upstream_error(&mut self, err: VoiceProviderError) -> Result<(), VoiceError> {
        if let VoiceProviderError::ClosedWithCode { code } = err {
            if CLOSE_IMMEDIATELY_CODES.contains(&code) {
                self.reset_to_idle().await;
                return Err(VoiceError::Provider(VoiceProviderError::ClosedWithCode { code }));
            }
        }
        // Other errors: log and continue until the LAST timeout resolves things.
        tracing::warn!(error = %err, "asr upstream error, continuing until LAST timeout");
        Ok(())
    }

    /// Silence resolution: send LAST, wait briefly for the final hypothesis,
    /// return the merged transcript, and transition back to `IDLE`.
    pub async fn on_silence_resolved(&mut self) -> Result<String, VoiceError> {
        let Some(mut session) = self.upstream.take() else {
            self.state = AsrState::Idle;
            return Ok(self.merger.best().to_string());
        };
        self.state = AsrState::Closing;
        self.merger.mark_last_sent();

        let _ = session.send_last().await;

        let deadline = Duration::from_millis(self.config.last_hypothesis_timeout_ms);
        let wait = async {
            while let Ok(Some(hypothesis)) = session.next_hypothesis().await {
                self.merger.ingest(&hypothesis.text);
                if hypothesis.is_final {
                    break;
                }
            }
        };
        let _ = tokio::time::timeout(deadline, wait).await;

        session.close().await;
        self.reset_to_idle().await;
        Ok(self.merger.best().to_string())
    }

    async fn reset_to_idle(&mut self) {
        if let Some(mut session) = self.upstream.take() {
            session.close().await;
        }
        self.cached_frames.clear();
        self.merger = HypothesisMerger::new();
        self.state = AsrState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_last_keeps_the_longest_hypothesis() {
        let mut merger = HypothesisMerger::new();
        merger.ingest("hel");
        merger.ingest("hello there");
        merger.ingest("hi");
        assert_eq!(merger.best(), "hello there");
    }

    #[test]
    fn after_last_newest_non_empty_replaces() {
        let mut merger = HypothesisMerger::new();
        merger.ingest("partial guess");
        merger.mark_last_sent();
        merger.ingest("final transcript");
        assert_eq!(merger.best(), "final transcript");
    }

    #[test]
    fn after_last_empty_string_is_rejected() {
        let mut merger = HypothesisMerger::new();
        merger.ingest("partial guess");
        merger.mark_last_sent();
        let accepted = merger.ingest("");
        assert!(!accepted);
        assert_eq!(merger.best(), "partial guess");
    }

    #[test]
    fn after_last_pure_punctuation_appends_stripping_duplicate_period() {
        let mut merger = HypothesisMerger::new();
        merger.ingest("hello there.");
        merger.mark_last_sent();
        merger.ingest(".");
        assert_eq!(merger.best(), "hello there.");
    }
}

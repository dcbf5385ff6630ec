//! `VADGate` — hysteresis and barge-in detection layered over a delegated
//! voice-activity provider.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gateway_core::{VadConfig, VadProvider};

/// Mirrors the device's `listen_mode` field; barge-in only fires in `Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VadDecision {
    /// Hysteresis-smoothed voice/silence classification for this frame.
    pub is_voice: bool,
    /// Set when voice was detected while TTS is playing in `Auto` mode —
    /// route this to `PacedSender`/`TTSSession` as an abort signal.
    pub barge_in: bool,
}

/// Delegates per-frame classification to a [`VadProvider`], adding a short
/// rolling hysteresis window and a post-wake-word self-echo suppression
/// period.
pub struct VadGate {
    provider: Arc<dyn VadProvider>,
    window: VecDeque<bool>,
    window_cap: usize,
    wake_suppression: Duration,
    suppressed_until: Option<Instant>,
}

impl VadGate {
    #[must_use]
    pub fn new(provider: Arc<dyn VadProvider>, config: VadConfig) -> Self {
        Self {
            provider,
            window: VecDeque::with_capacity(config.hysteresis_window),
            window_cap: config.hysteresis_window,
            wake_suppression: Duration::from_millis(config.wake_suppression_ms),
            suppressed_until: None,
        }
    }

    /// Call right after a wake-word response finishes speaking: forces
    /// silence for the configured suppression window so the device's own
    /// playback is never mistaken for the user speaking again.
    pub fn mark_just_awakened(&mut self, now: Instant) {
        self.suppressed_until = Some(now + self.wake_suppression);
        self.window.clear();
    }

    /// Classify one inbound PCM frame.
    pub fn process_frame(
        &mut self,
        pcm_frame: &[i16],
        now: Instant,
        tts_playing: bool,
        listen_mode: ListenMode,
    ) -> VadDecision {
        let raw = if self.suppressed_until.is_some_and(|until| now < until) {
            false
        } else {
            self.suppressed_until = None;
            self.provider.is_speech(pcm_frame)
        };

        if self.window.len() == self.window_cap {
            self.window.pop_front();
        }
        self.window.push_back(raw);

        // Hysteresis: majority vote across the window.
        let voice_votes = self.window.iter().filter(|v| **v).count();
        let is_voice = voice_votes * 2 > self.window.len();

        let barge_in = is_voice && tts_playing && listen_mode == ListenMode::Auto;

        VadDecision { is_voice, barge_in }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedVad(bool);
    impl VadProvider for FixedVad {
        fn is_speech(&self, _pcm_frame: &[i16]) -> bool {
            self.0
        }
    }

    fn config() -> VadConfig {
        VadConfig {
            hysteresis_window: 5,
            wake_suppression_ms: 2_000,
        }
    }

    #[test]
    fn majority_silence_yields_no_voice() {
        let mut gate = VadGate::new(Arc::new(FixedVad(false)), config());
        let now = Instant::now();
        let decision = gate.process_frame(&[], now, false, ListenMode::Auto);
        assert!(!decision.is_voice);
    }

    #[test]
    fn majority_voice_yields_voice() {
        let mut gate = VadGate::new(Arc::new(FixedVad(true)), config());
        let now = Instant::now();
        for _ in 0..5 {
            gate.process_frame(&[], now, false, ListenMode::Auto);
        }
        let decision = gate.process_frame(&[], now, false, ListenMode::Auto);
        assert!(decision.is_voice);
    }

    #[test]
    fn wake_suppression_forces_silence_for_the_configured_window() {
        let mut gate = VadGate::new(Arc::new(FixedVad(true)), config());
        let now = Instant::now();
        gate.mark_just_awakened(now);
        let decision = gate.process_frame(&[], now, false, ListenMode::Auto);
        assert!(!decision.is_voice);
    }

    #[test]
    fn barge_in_only_fires_while_tts_is_playing_in_auto_mode() {
        let mut gate = VadGate::new(Arc::new(FixedVad(true)), config());
        let now = Instant::now();
        for _ in 0..5 {
            gate.process_frame(&[], now, true, ListenMode::Auto);
        }
        let decision = gate.process_frame(&[], now, true, ListenMode::Auto);
        assert!(decision.barge_in);

        let mut gate_manual = VadGate::new(Arc::new(FixedVad(true)), config());
        for _ in 0..5 {
            gate_manual.process_frame(&[], now, true, ListenMode::Manual);
        }
        let decision = gate_manual.process_frame(&[], now, true, ListenMode::Manual);
        assert!(!decision.barge_in);
    }
}

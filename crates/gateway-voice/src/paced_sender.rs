//! `PacedSender` — drains opus frames to the device at real time.
//!
//! Pre-buffers the first few frames of a sentence, then holds to
//! `frame_duration_ms` either via a fixed per-frame delay or (default) a
//! drift-free rate controller that recomputes elapsed time against a
//! single monotonic start rather than sleeping a fixed amount each frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use uuid::Uuid;

use gateway_core::PacedSenderConfig;

use crate::audio_frame::wrap_egress_frame;
use crate::error::VoiceError;

/// Destination for paced egress frames — the device's own socket, in
/// production; a channel-backed fake in tests.
#[async_trait]
pub trait DeviceSink: Send + Sync {
    async fn send(&self, frame: Vec<u8>) -> Result<(), VoiceError>;
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Per-sentence pacing state. Always fully initialized at construction and
/// on every [`PacedSender::reset_for_sentence`] — never read in a
/// never-initialized state (spec §9 open question (b)).
pub struct PacedSender {
    config: PacedSenderConfig,
    current_sentence: Option<Uuid>,
    sequence: u32,
    frame_index: u32,
    start: Option<Instant>,
}

impl PacedSender {
    #[must_use]
    pub fn new(config: PacedSenderConfig) -> Self {
        Self {
            config,
            current_sentence: None,
            sequence: 0,
            frame_index: 0,
            start: None,
        }
    }

    /// A `sentence_id` change implies a full state reset.
    pub fn reset_for_sentence(&mut self, sentence_id: Uuid) {
        self.current_sentence = Some(sentence_id);
        self.sequence = 0;
        self.frame_index = 0;
        self.start = None;
    }

    /// Send one opus frame, pacing and (for MQTT-gateway connections)
    /// wrapping it with the 16-byte in-band header. Returns `Ok(false)`
    /// without sending if `client_abort` is set (barge-in).
    pub async fn send_frame(
        &mut self,
        sink: &dyn DeviceSink,
        opus: &[u8],
        client_abort: &AtomicBool,
        from_mqtt_gateway: bool,
    ) -> Result<bool, VoiceError> {
        if client_abort.load(Ordering::SeqCst) {
            return Ok(false);
        }

        if self.frame_index < self.config.pre_buffer_frames as u32 {
            self.start.get_or_insert_with(Instant::now);
        } else if self.config.tts_audio_send_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.tts_audio_send_delay_ms)).await;
        } else {
            let start = *self.start.get_or_insert_with(Instant::now);
            let target = Duration::from_millis(u64::from(self.frame_index) * self.config.frame_duration_ms);
            let elapsed = start.elapsed();
            if target > elapsed {
                tokio::time::sleep(target - elapsed).await;
            }
        }

        let payload = if from_mqtt_gateway {
            self.sequence += 1;
            let timestamp_ms = (wall_clock_ms() % (1u64 << 32)) as u32;
            wrap_egress_frame(opus, 0, self.sequence, timestamp_ms)
        } else {
            opus.to_vec()
        };

        sink.send(payload).await?;
        self.frame_index += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct RecordingSink {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl DeviceSink for RecordingSink {
        async fn send(&self, frame: Vec<u8>) -> Result<(), VoiceError> {
            self.frames.lock().await.push(frame);
            Ok(())
        }
    }

    fn config() -> PacedSenderConfig {
        PacedSenderConfig {
            frame_duration_ms: 60,
            pre_buffer_frames: 5,
            tts_audio_send_delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn pre_buffer_frames_send_without_delay() {
        let sink = RecordingSink { frames: Mutex::new(Vec::new()) };
        let mut sender = PacedSender::new(config());
        sender.reset_for_sentence(Uuid::new_v4());
        let abort = AtomicBool::new(false);

        let start = Instant::now();
        for _ in 0..5 {
            sender.send_frame(&sink, &[1, 2, 3], &abort, false).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(sink.frames.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn barge_in_drops_remaining_frames() {
        let sink = RecordingSink { frames: Mutex::new(Vec::new()) };
        let mut sender = PacedSender::new(config());
        sender.reset_for_sentence(Uuid::new_v4());
        let abort = AtomicBool::new(false);

        sender.send_frame(&sink, &[1], &abort, false).await.unwrap();
        abort.store(true, Ordering::SeqCst);
        let sent = sender.send_frame(&sink, &[2], &abort, false).await.unwrap();
        assert!(!sent);
        assert_eq!(sink.frames.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn mqtt_gateway_frames_carry_the_16_byte_header_with_increasing_sequence() {
        let sink = RecordingSink { frames: Mutex::new(Vec::new()) };
        let mut sender = PacedSender::new(config());
        sender.reset_for_sentence(Uuid::new_v4());
        let abort = AtomicBool::new(false);

        sender.send_frame(&sink, &[9, 9], &abort, true).await.unwrap();
        sender.send_frame(&sink, &[9, 9], &abort, true).await.unwrap();

        let frames = sink.frames.lock().await;
        assert_eq!(frames[0][4..8], 1u32.to_be_bytes());
        assert_eq!(frames[1][4..8], 2u32.to_be_bytes());
    }

    #[tokio::test]
    async fn reset_for_sentence_reinitializes_all_pacing_state() {
        let sink = RecordingSink { frames: Mutex::new(Vec::new()) };
        let mut sender = PacedSender::new(config());
        sender.reset_for_sentence(Uuid::new_v4());
        let abort = AtomicBool::new(false);
        for _ in 0..5 {
            sender.send_frame(&sink, &[1], &abort, true).await.unwrap();
        }
        sender.reset_for_sentence(Uuid::new_v4());
        assert_eq!(sender.sequence, 0);
        assert_eq!(sender.frame_index, 0);
    }
}

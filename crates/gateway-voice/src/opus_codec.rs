//! Thin wrapper around `audiopus` for the 16 kHz mono, 60 ms frame shape
//! used throughout the pipeline.

use audiopus::coder::{Decoder, Encoder};
use audiopus::{Application, Channels, SampleRate};

use crate::error::VoiceError;

const SAMPLE_RATE: SampleRate = SampleRate::Hz16000;
/// 60 ms at 16 kHz mono.
pub const SAMPLES_PER_FRAME: usize = 960;

pub struct OpusEncoderWrapper {
    encoder: Encoder,
}

impl OpusEncoderWrapper {
    pub fn new() -> Result<Self, VoiceError> {
        let encoder = Encoder::new(SAMPLE_RATE, Channels::Mono, Application::Voip)
            .map_err(|e| VoiceError::Codec(e.to_string()))?;
        Ok(Self { encoder })
    }

    /// Encode one PCM16 frame (padded/truncated to [`SAMPLES_PER_FRAME`] by
    /// the caller) to an opus packet.
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>, VoiceError> {
        let mut out = vec![0u8; 4000];
        let len = self
            .encoder
            .encode(pcm, &mut out)
            .map_err(|e| VoiceError::Codec(e.to_string()))?;
        out.truncate(len);
        Ok(out)
    }
}

pub struct OpusDecoderWrapper {
    decoder: Decoder,
}

impl OpusDecoderWrapper {
    pub fn new() -> Result<Self, VoiceError> {
        let decoder =
            Decoder::new(SAMPLE_RATE, Channels::Mono).map_err(|e| VoiceError::Codec(e.to_string()))?;
        Ok(Self { decoder })
    }

    /// Decode one opus packet to PCM16 mono.
    pub fn decode(&mut self, opus: &[u8]) -> Result<Vec<i16>, VoiceError> {
        let mut out = vec![0i16; SAMPLES_PER_FRAME];
        let samples = self
            .decoder
            .decode(Some(opus), &mut out, false)
            .map_err(|e| VoiceError::Codec(e.to_string()))?;
        out.truncate(samples);
        Ok(out)
    }
}

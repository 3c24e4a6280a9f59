//! HTTP-calling [`SttBackend`]/[`TtsBackend`] adapters over the external
//! [`TranscriptionProvider`]/[`TtsProvider`] ports (spec §6.4).
//!
//! These are the only concrete backend implementations in this crate — the
//! teacher's local `whisper`/`sherpa`/`kokoro` engines are replaced entirely,
//! since transcription and synthesis now happen outside this workspace.

use std::sync::Mutex;

use async_trait::async_trait;
use opencane_core::ports::{TranscriptionProvider, TtsProvider};

use super::{SttBackend, TtsAudio, TtsBackend, VoiceInfo};
use crate::error::VoiceError;

/// Sample rate this crate sends to and expects back from providers.
///
/// The wire format is raw 16-bit little-endian PCM mono at this rate; the
/// provider is responsible for any resampling on its side.
pub const PCM_SAMPLE_RATE: u32 = 16_000;

fn samples_to_pcm16le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        #[allow(clippy::cast_possible_truncation)]
        let v = (clamped * f32::from(i16::MAX)) as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn pcm16le_to_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / f32::from(i16::MAX))
        .collect()
}

/// Speech-to-text via an external [`TranscriptionProvider`].
pub struct HttpSttBackend {
    provider: std::sync::Arc<dyn TranscriptionProvider>,
    language: String,
}

impl HttpSttBackend {
    #[must_use]
    pub fn new(provider: std::sync::Arc<dyn TranscriptionProvider>, language: String) -> Self {
        Self { provider, language }
    }
}

#[async_trait]
impl SttBackend for HttpSttBackend {
    async fn transcribe(&self, audio: &[f32]) -> Result<String, VoiceError> {
        if audio.is_empty() {
            return Ok(String::new());
        }
        let bytes = samples_to_pcm16le(audio);
        match self.provider.transcribe(&bytes, "audio/pcm;rate=16000").await {
            Ok(result) => Ok(result.text),
            Err(e) => {
                tracing::warn!(error = %e, "transcription provider call failed");
                Err(VoiceError::TranscriptionError(e.to_string()))
            }
        }
    }

    fn language(&self) -> &str {
        &self.language
    }
}

/// Text-to-speech via an external [`TtsProvider`].
pub struct HttpTtsBackend {
    provider: std::sync::Arc<dyn TtsProvider>,
    voice: Mutex<String>,
    speed: Mutex<f32>,
}

impl HttpTtsBackend {
    #[must_use]
    pub fn new(provider: std::sync::Arc<dyn TtsProvider>, voice: String, speed: f32) -> Self {
        Self {
            provider,
            voice: Mutex::new(voice),
            speed: Mutex::new(speed),
        }
    }
}

#[async_trait]
impl TtsBackend for HttpTtsBackend {
    async fn synthesize(&self, text: &str) -> Result<TtsAudio, VoiceError> {
        if text.trim().is_empty() {
            return Ok(TtsAudio {
                samples: Vec::new(),
                sample_rate: PCM_SAMPLE_RATE,
                duration: std::time::Duration::ZERO,
            });
        }
        let bytes = self
            .provider
            .synthesize(text)
            .await
            .map_err(|e| VoiceError::SynthesisError(e.to_string()))?;
        let samples = pcm16le_to_samples(&bytes);
        #[allow(clippy::cast_precision_loss)]
        let duration = std::time::Duration::from_secs_f64(
            f64::from(u32::try_from(samples.len()).unwrap_or(u32::MAX)) / f64::from(PCM_SAMPLE_RATE),
        );
        Ok(TtsAudio {
            samples,
            sample_rate: PCM_SAMPLE_RATE,
            duration,
        })
    }

    fn set_voice(&mut self, voice_id: &str) {
        *self.voice.lock().expect("voice mutex poisoned") = voice_id.to_string();
    }

    fn set_speed(&mut self, speed: f32) {
        *self.speed.lock().expect("speed mutex poisoned") = speed.clamp(0.5, 2.0);
    }

    fn voice(&self) -> String {
        self.voice.lock().expect("voice mutex poisoned").clone()
    }

    fn sample_rate(&self) -> u32 {
        PCM_SAMPLE_RATE
    }

    fn available_voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_round_trip_preserves_amplitude_within_quantization() {
        let samples = vec![0.0_f32, 0.5, -0.5, 1.0, -1.0];
        let bytes = samples_to_pcm16le(&samples);
        let back = pcm16le_to_samples(&bytes);
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((a - b).abs() < 0.001, "{a} vs {b}");
        }
    }
}

//! `TranscriptionProvider` (spec §6.4): speech-to-text, external to this
//! workspace. Invoked by `opencane-voice` when a `listen_stop` payload does
//! not already carry a device-side transcript.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription provider call timed out")]
    Timeout,
    #[error("transcription provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    pub text: String,
    pub confidence: f32,
}

#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe `bytes` (encoded as `mime`, e.g. `audio/pcm`). Spec §4.5:
    /// on failure, callers fall back to an empty transcript and a
    /// `voice_turn_failure` telemetry event rather than failing the turn.
    async fn transcribe(
        &self,
        bytes: &[u8],
        mime: &str,
    ) -> Result<TranscriptionResult, TranscriptionError>;
}

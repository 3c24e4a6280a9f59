//! `TTSProvider` (spec §6.4): text-to-speech, external to this workspace.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("tts provider call timed out")]
    Timeout,
    #[error("tts provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesize `text` to audio bytes. Used only in `server_audio` TTS
    /// mode (spec §4.6); in `device_text` mode the text is sent as-is.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError>;
}

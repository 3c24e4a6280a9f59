//! Voice mode error types.

use std::path::PathBuf;

/// Errors that can occur in the voice pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// VAD model file not found at expected path.
    #[error("voice model not found at {0}")]
    ModelNotFound(PathBuf),

    /// Failed to load a VAD model.
    #[error("failed to load VAD model: {0}")]
    ModelLoadError(String),

    /// Transcription failed (provider error or malformed response).
    #[error("transcription failed: {0}")]
    TranscriptionError(String),

    /// Speech synthesis failed (provider error or malformed response).
    #[error("speech synthesis failed: {0}")]
    SynthesisError(String),

    /// Voice pipeline is already active.
    #[error("voice pipeline is already active")]
    AlreadyActive,

    /// Voice pipeline is not active.
    #[error("voice pipeline is not active")]
    NotActive,

    /// IO error (model files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

//! Audio Pipeline (C5, spec §4.5): jitter reorder buffer, VAD, and the
//! STT/TTS provider gateway for one session's voice turns.

#![deny(unused_crate_dependencies)]

pub mod backend;
pub mod error;
pub mod gate;
pub mod jitter;
pub mod pipeline;
pub mod text_utils;
pub mod vad;

pub use backend::{SttBackend, SttConfig, TtsAudio, TtsBackend, TtsConfig, VoiceGender, VoiceInfo};
pub use backend::http::{HttpSttBackend, HttpTtsBackend};
pub use backend::provider::{HttpTranscriptionProvider, HttpTtsProvider};
pub use error::VoiceError;
pub use gate::EchoGate;
pub use jitter::{JitterBuffer, JitterPacket};
pub use pipeline::{VoiceEvent, VoicePipeline, VoicePipelineConfig, VoiceState};
pub use vad::{VadConfig, VadEvent, VadState, VoiceActivityDetector};

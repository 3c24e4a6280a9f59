//! Voice pipeline orchestrator — coordinates the jitter buffer, VAD, and
//! the STT/TTS provider backends for one session's audio segment (spec
//! §4.5).
//!
//! Unlike the teacher's pipeline, audio does not arrive from a local
//! microphone: `audio_chunk` envelope payloads decoded upstream are pushed
//! in via [`VoicePipeline::push_audio_chunk`], reordered by
//! [`crate::jitter::JitterBuffer`], and fed frame-by-frame to the VAD.
//! `listen_stop` is finalized via [`VoicePipeline::finalize`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::backend::{SttBackend, TtsBackend};
use crate::error::VoiceError;
use crate::gate::EchoGate;
use crate::jitter::JitterBuffer;
use crate::text_utils;
use crate::vad::{VadConfig, VadEvent, VoiceActivityDetector};

/// Current state of the voice pipeline for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceState {
    /// Pipeline is idle — no active capture segment.
    Idle,
    /// Listening for speech; VAD running over reordered frames.
    Listening,
    /// Speech detected, accumulating audio.
    Recording,
    /// Transcribing captured audio via the `TranscriptionProvider`.
    Transcribing,
    /// Playing back TTS audio.
    Speaking,
    /// An error occurred — voice mode paused.
    Error,
}

/// Events emitted by the voice pipeline to the connection runtime.
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    /// Pipeline state changed.
    StateChanged(VoiceState),
    /// A transcript was produced from speech (`stt_partial` / `stt_final`).
    Transcript { text: String, is_final: bool },
    /// TTS playback started.
    SpeakingStarted,
    /// TTS playback finished.
    SpeakingFinished,
    /// A chunk of synthesized audio is ready to stream out (`tts_chunk`).
    TtsAudioChunk { samples: Vec<f32>, sample_rate: u32 },
    /// Transcription or synthesis failed; the session remains usable (spec
    /// §4.5 "Failure").
    TurnFailure(String),
}

/// Configuration for the voice pipeline.
#[derive(Clone)]
pub struct VoicePipelineConfig {
    /// VAD configuration.
    pub vad: VadConfig,
    /// Jitter reorder buffer window, in packets (spec §4.5 default 32).
    pub jitter_window_packets: usize,
    /// Jitter reorder buffer window, in time (spec §4.5 default 1.5s).
    pub jitter_window: Duration,
    /// Sample rate of inbound audio frames.
    pub sample_rate: u32,
    /// Optional path to a Silero VAD ONNX model.
    pub vad_model_path: Option<std::path::PathBuf>,
}

impl Default for VoicePipelineConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            jitter_window_packets: 32,
            jitter_window: Duration::from_millis(1_500),
            sample_rate: 16_000,
            vad_model_path: None,
        }
    }
}

/// One session's voice pipeline: jitter buffer + VAD + STT/TTS backends.
pub struct VoicePipeline {
    state: VoiceState,
    echo_gate: EchoGate,
    jitter: JitterBuffer,
    vad: VoiceActivityDetector,
    stt: Arc<dyn SttBackend>,
    tts: Arc<dyn TtsBackend>,
    event_tx: mpsc::UnboundedSender<VoiceEvent>,
    partial_threshold_chars: usize,
    last_partial_len: usize,
    pending_utterance: Option<Vec<f32>>,
}

impl VoicePipeline {
    /// Create a new voice pipeline bound to the given STT/TTS backends.
    #[must_use]
    pub fn new(
        config: VoicePipelineConfig,
        stt: Arc<dyn SttBackend>,
        tts: Arc<dyn TtsBackend>,
    ) -> (Self, mpsc::UnboundedReceiver<VoiceEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let echo_gate = EchoGate::new();

        let mut vad = VoiceActivityDetector::new(config.vad.clone(), echo_gate.clone(), config.sample_rate);
        if let Some(ref model_path) = config.vad_model_path {
            if let Err(e) = vad.load_silero_model(model_path) {
                tracing::warn!(error = %e, "failed to load Silero VAD model, falling back to energy-based VAD");
            }
        }
        vad.start();

        let pipeline = Self {
            state: VoiceState::Idle,
            echo_gate,
            jitter: JitterBuffer::new(config.jitter_window_packets, config.jitter_window),
            vad,
            stt,
            tts,
            event_tx,
            partial_threshold_chars: 40,
            last_partial_len: 0,
            pending_utterance: None,
        };

        (pipeline, event_rx)
    }

    #[must_use]
    pub const fn state(&self) -> VoiceState {
        self.state
    }

    #[must_use]
    pub fn echo_gate(&self) -> EchoGate {
        self.echo_gate.clone()
    }

    /// Open a new capture segment (`listen_start`).
    pub fn open_segment(&mut self) {
        self.jitter = JitterBuffer::new(self.jitter.window_packets(), self.jitter.window());
        self.last_partial_len = 0;
        self.set_state(VoiceState::Listening);
    }

    /// Feed one `audio_chunk` envelope's decoded samples into the segment
    /// (`LISTENING` → `audio_chunk` in the connection runtime's table).
    ///
    /// Frames are reordered by [`JitterBuffer`] before reaching the VAD, so
    /// a late-but-in-window packet can still shift already-fed frames.
    pub fn push_audio_chunk(&mut self, seq: u64, samples: Vec<f32>) {
        let ready = self.jitter.push(seq, samples);
        self.feed_ready(ready);
    }

    fn feed_ready(&mut self, ready: Vec<crate::jitter::JitterPacket>) {
        for packet in ready {
            match self.vad.process_frame(&packet.samples) {
                Some(VadEvent::SpeechStart) => {
                    self.set_state(VoiceState::Recording);
                }
                Some(VadEvent::SpeechEnd { audio }) => {
                    self.set_state(VoiceState::Listening);
                    self.pending_utterance = Some(audio);
                }
                Some(VadEvent::Listening) | None => {}
            }
        }
    }

    /// Finalize the segment (`listen_stop`). If `device_transcript` is
    /// `Some`, it is used verbatim (spec §4.5) and no provider call is
    /// made. Otherwise the accumulated voiced audio is transcribed.
    ///
    /// On provider failure returns an empty transcript and emits
    /// [`VoiceEvent::TurnFailure`]; the session remains usable.
    pub async fn finalize(&mut self, device_transcript: Option<String>) -> String {
        self.set_state(VoiceState::Transcribing);

        let text = if let Some(text) = device_transcript {
            text
        } else {
            let audio = self.pending_utterance.take().unwrap_or_default();
            if audio.is_empty() {
                String::new()
            } else {
                match self.stt.transcribe(&audio).await {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "transcription failed, continuing with empty transcript");
                        self.emit(VoiceEvent::TurnFailure(e.to_string()));
                        String::new()
                    }
                }
            }
        };

        if !text.is_empty() {
            self.emit(VoiceEvent::Transcript { text: text.clone(), is_final: true });
        }

        self.set_state(VoiceState::Idle);
        text
    }

    /// Emit `stt_partial` commands for a growing transcript above the
    /// configured threshold (spec §4.5). The final call should go through
    /// [`finalize`] instead.
    pub fn emit_partial_if_due(&mut self, partial_text: &str) {
        if partial_text.len() >= self.last_partial_len + self.partial_threshold_chars {
            self.last_partial_len = partial_text.len();
            self.emit(VoiceEvent::Transcript {
                text: partial_text.to_string(),
                is_final: false,
            });
        }
    }

    /// Speak text through the TTS backend, streaming chunks incrementally.
    ///
    /// Long text is stripped of markdown and split into sentence-sized
    /// chunks. A chunk that fails to synthesize is skipped (matching the
    /// teacher's `pipeline.rs::speak` pattern of continuing with the
    /// remaining chunks rather than failing the whole utterance).
    pub async fn speak(&mut self, text: &str) -> Result<(), VoiceError> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let plain = text_utils::strip_markdown(text);
        let chunks = text_utils::split_into_chunks(&plain);
        if chunks.is_empty() {
            return Ok(());
        }

        self.echo_gate.start_speaking();
        self.set_state(VoiceState::Speaking);
        self.emit(VoiceEvent::SpeakingStarted);

        let mut any_audio = false;
        let mut failed_chunks = 0usize;
        let total_chunks = chunks.len();

        for (i, chunk) in chunks.iter().enumerate() {
            match self.tts.synthesize(chunk).await {
                Ok(audio) => {
                    any_audio = true;
                    self.emit(VoiceEvent::TtsAudioChunk {
                        samples: audio.samples,
                        sample_rate: audio.sample_rate,
                    });
                }
                Err(e) => {
                    failed_chunks += 1;
                    tracing::warn!(chunk = i + 1, error = %e, "failed to synthesize chunk, skipping");
                }
            }
        }

        if failed_chunks > 0 {
            tracing::warn!(failed = failed_chunks, total = total_chunks, "tts synthesis completed with chunk failures");
        }

        self.echo_gate.stop_speaking();
        self.emit(VoiceEvent::SpeakingFinished);
        self.set_state(VoiceState::Idle);

        if !any_audio {
            self.emit(VoiceEvent::TurnFailure("all chunks failed to synthesize".to_string()));
        }

        Ok(())
    }

    /// Abort any in-flight speech playback (barge-in, spec §4.6).
    pub fn stop_speaking(&mut self) {
        self.echo_gate.stop_speaking();
        self.emit(VoiceEvent::SpeakingFinished);
        self.set_state(VoiceState::Idle);
    }

    fn set_state(&mut self, new_state: VoiceState) {
        if self.state != new_state {
            self.state = new_state;
            self.emit(VoiceEvent::StateChanged(new_state));
        }
    }

    fn emit(&self, event: VoiceEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::warn!("voice event receiver dropped");
        }
    }
}

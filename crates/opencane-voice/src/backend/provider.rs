//! Concrete HTTP-calling implementations of `opencane_core::ports::{TranscriptionProvider, TtsProvider}`.
//!
//! These are the "external, outside this workspace" providers spec §6.4
//! describes — a plain JSON-over-HTTP contract, since the spec leaves the
//! wire format up to the implementation.

use async_trait::async_trait;
use opencane_core::ports::{TranscriptionError, TranscriptionProvider, TranscriptionResult, TtsError, TtsProvider};
use serde::{Deserialize, Serialize};

fn map_reqwest_err(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timed out".to_string()
    } else {
        e.to_string()
    }
}

/// Calls a transcription HTTP endpoint that accepts raw audio bytes and
/// returns `{"text": "...", "confidence": 0.0-1.0}`.
pub struct HttpTranscriptionProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranscriptionProvider {
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint }
    }
}

#[derive(Deserialize)]
struct TranscribeResponseBody {
    text: String,
    #[serde(default)]
    confidence: Option<f32>,
}

#[async_trait]
impl TranscriptionProvider for HttpTranscriptionProvider {
    async fn transcribe(&self, bytes: &[u8], mime: &str) -> Result<TranscriptionResult, TranscriptionError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranscriptionError::Timeout
                } else {
                    TranscriptionError::Provider(map_reqwest_err(&e))
                }
            })?;

        let body: TranscribeResponseBody = resp
            .json()
            .await
            .map_err(|e| TranscriptionError::Provider(e.to_string()))?;

        Ok(TranscriptionResult {
            text: body.text,
            confidence: body.confidence.unwrap_or(1.0),
        })
    }
}

/// Calls a synthesis HTTP endpoint that accepts `{"text": "..."}` and
/// returns raw audio bytes (PCM16LE mono, see [`super::http::PCM_SAMPLE_RATE`]).
pub struct HttpTtsProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTtsProvider {
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint }
    }
}

#[derive(Serialize)]
struct SynthesizeRequestBody<'a> {
    text: &'a str,
}

#[async_trait]
impl TtsProvider for HttpTtsProvider {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&SynthesizeRequestBody { text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TtsError::Timeout
                } else {
                    TtsError::Provider(map_reqwest_err(&e))
                }
            })?;

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| TtsError::Provider(e.to_string()))
    }
}

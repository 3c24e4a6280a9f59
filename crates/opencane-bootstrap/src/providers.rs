//! HTTP-calling implementations of `opencane_core::ports::{DialogueEngine,
//! VisionProvider}` (spec §6.4) — the same plain JSON-over-HTTP contract
//! shape as `opencane_voice::backend::provider`'s
//! `HttpTranscriptionProvider`/`HttpTtsProvider`, generalized to these two
//! remaining external-provider ports.

use async_trait::async_trait;
use opencane_core::ports::{
    DialogueEngine, DialogueError, DialogueReply, RiskLevel, VisionError, VisionProvider, VisionResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn map_reqwest_err(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timed out".to_string()
    } else {
        e.to_string()
    }
}

/// Calls a dialogue/agent HTTP endpoint that accepts
/// `{"session_context": ..., "transcript": "..."}` and returns
/// `{"text": "...", "thought_trace": ...}`.
pub struct HttpDialogueEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDialogueEngine {
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint }
    }
}

#[derive(Serialize)]
struct ReplyRequestBody<'a> {
    session_context: &'a Value,
    transcript: &'a str,
}

#[derive(Deserialize)]
struct ReplyResponseBody {
    text: String,
    #[serde(default)]
    thought_trace: Option<Value>,
}

#[async_trait]
impl DialogueEngine for HttpDialogueEngine {
    async fn reply(&self, session_context: &Value, transcript: &str) -> Result<DialogueReply, DialogueError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&ReplyRequestBody { session_context, transcript })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DialogueError::Timeout
                } else {
                    DialogueError::Provider(map_reqwest_err(&e))
                }
            })?;

        let body: ReplyResponseBody = resp.json().await.map_err(|e| DialogueError::Provider(e.to_string()))?;
        Ok(DialogueReply { text: body.text, thought_trace: body.thought_trace })
    }
}

/// Calls a vision-model HTTP endpoint with the image's raw bytes and an
/// optional question as headers, expecting a structured `VisionResult` JSON
/// body back (spec §4.8 step 4: "if the provider only returns free text,
/// callers place it in `summary`").
pub struct HttpVisionProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVisionProvider {
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint }
    }
}

#[derive(Deserialize)]
struct VisionResponseBody {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    objects: Vec<String>,
    #[serde(default)]
    ocr: Vec<String>,
    #[serde(default)]
    risk_hints: Vec<String>,
    #[serde(default)]
    actionable_summary: Option<String>,
    #[serde(default)]
    risk_level: Option<RiskLevel>,
    #[serde(default)]
    risk_score: Option<f32>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[async_trait]
impl VisionProvider for HttpVisionProvider {
    async fn analyze(&self, bytes: &[u8], mime: &str, question: Option<&str>) -> Result<VisionResult, VisionError> {
        let mut request = self.client.post(&self.endpoint).header(reqwest::header::CONTENT_TYPE, mime).body(bytes.to_vec());
        if let Some(q) = question {
            request = request.header("X-Question", q);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                VisionError::Timeout
            } else {
                VisionError::Provider(map_reqwest_err(&e))
            }
        })?;

        if resp.headers().get(reqwest::header::CONTENT_TYPE).is_some_and(|v| v.as_bytes().starts_with(b"text/plain")) {
            let text = resp.text().await.map_err(|e| VisionError::Provider(e.to_string()))?;
            return Ok(VisionResult::from_free_text(text));
        }

        let body: VisionResponseBody = resp.json().await.map_err(|e| VisionError::Provider(e.to_string()))?;
        Ok(VisionResult {
            summary: body.summary,
            objects: body.objects,
            ocr: body.ocr,
            risk_hints: body.risk_hints,
            actionable_summary: body.actionable_summary,
            risk_level: body.risk_level,
            risk_score: body.risk_score,
            confidence: body.confidence,
        })
    }
}

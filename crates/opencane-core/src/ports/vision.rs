//! `VisionProvider` (spec §6.4): the external vision model the Vision
//! Pipeline (C8) calls on a dedup miss.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision provider call timed out")]
    Timeout,
    #[error("vision provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    P0,
    P1,
    P2,
    P3,
}

/// Structured vision result (spec §4.8 step 4). If the provider only returns
/// free text, callers place it in `summary` and leave the rest empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionResult {
    pub summary: String,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub ocr: Vec<String>,
    #[serde(default)]
    pub risk_hints: Vec<String>,
    #[serde(default)]
    pub actionable_summary: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub risk_score: Option<f32>,
    pub confidence: Option<f32>,
}

impl VisionResult {
    #[must_use]
    pub fn from_free_text(text: String) -> Self {
        Self {
            summary: text,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    async fn analyze(
        &self,
        bytes: &[u8],
        mime: &str,
        question: Option<&str>,
    ) -> Result<VisionResult, VisionError>;
}

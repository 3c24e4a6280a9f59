//! Vision Pipeline (C8, spec §4.8): persist → hash → dedup → analyze →
//! persist → reply, run as an [`ImageJobProcessor`](crate::ingest::ImageJobProcessor)
//! so the Ingest Queue only ever sees this trait, never the concrete steps.
//!
//! dHash is computed with the `image` crate (already in the corpus via
//! `saorsa-labs-fae`'s avatar pipeline) rather than a bespoke perceptual-hash
//! crate — 9x8 grayscale downsample, adjacent-pixel comparison, the
//! textbook difference hash.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use image::imageops::FilterType;
use opencane_core::domain::{ImageJob, ImageJobStatus};
use opencane_core::ports::{
    LifelogContext, LifelogImageRecord, RiskLevel, Store, VisionProvider, VisionResult,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::ingest::ImageJobProcessor;

#[derive(Debug, Error)]
pub enum VisionPipelineError {
    #[error("could not decode image: {0}")]
    Decode(String),
}

/// Delivers the pipeline's final `tts_chunk`-bound reply back to the
/// Connection Runtime, keeping this module ignorant of envelopes and
/// transport (spec §4.8 step 6: "dispatch bounded `tts_chunk`"). Carries
/// `risk_level` so the Connection Runtime can feed P0 hints into the safety
/// gate's rule 4 (spec §4.10: "must not contradict a P0 hint issued within
/// the last 10s").
#[async_trait]
pub trait VisionReplySink: Send + Sync {
    async fn deliver_vision_reply(
        &self,
        session_id: &str,
        device_id: &str,
        job_id: &str,
        text: &str,
        risk_level: Option<RiskLevel>,
    );
}

/// dHash Hamming distance at or below this is treated as the same scene
/// (spec §4.8 step 3, default 8 on a 64-bit hash).
pub struct VisionPipelineConfig {
    pub dedup_hamming_threshold: u32,
    pub dedup_window: chrono::Duration,
}

pub struct VisionPipeline {
    store: Arc<dyn Store>,
    provider: Arc<dyn VisionProvider>,
    vector_index: Arc<dyn opencane_core::ports::VectorIndex>,
    asset_store: Arc<opencane_db::asset_store::AssetStore>,
    reply_sink: Arc<dyn VisionReplySink>,
    config: VisionPipelineConfig,
}

impl VisionPipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn VisionProvider>,
        vector_index: Arc<dyn opencane_core::ports::VectorIndex>,
        asset_store: Arc<opencane_db::asset_store::AssetStore>,
        reply_sink: Arc<dyn VisionReplySink>,
        config: VisionPipelineConfig,
    ) -> Self {
        Self { store, provider, vector_index, asset_store, reply_sink, config }
    }

    async fn run(&self, mut job: ImageJob, cancel: CancellationToken) {
        job.status = ImageJobStatus::Processing;

        let dhash = match compute_dhash(&job.bytes) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "dhash computation failed, treating as non-dedupable");
                0
            }
        };
        job.dhash = Some(dhash);
        let content_hash = compute_content_hash(&job.bytes);

        let since = Utc::now() - self.config.dedup_window;
        let recent = self
            .store
            .recent_lifelog_images(&job.session_id, since)
            .await
            .unwrap_or_default();
        let duplicate = recent
            .iter()
            .find(|existing| hamming_distance(existing.dhash, dhash) <= self.config.dedup_hamming_threshold);

        if let Some(existing) = duplicate {
            job.status = ImageJobStatus::Deduped;
            let text = match self.store.lifelog_context_for_job(&existing.job_id).await {
                Ok(Some(context)) => context.summary,
                _ => "I've already described a very similar view recently.".to_string(),
            };
            self.reply_sink
                .deliver_vision_reply(&job.session_id, &job.device_id, &job.job_id, &text, None)
                .await;
            return;
        }

        let ext = mime_extension(&job.mime);
        let asset_uri = match self.asset_store.write_image(&job.session_id, Utc::now(), &content_hash, ext, &job.bytes) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "failed to persist image asset");
                job.status = ImageJobStatus::Failed;
                self.reply_sink
                    .deliver_vision_reply(&job.session_id, &job.device_id, &job.job_id, "I couldn't save that image.", None)
                    .await;
                return;
            }
        };

        let analysis = tokio::select! {
            result = self.provider.analyze(&job.bytes, &job.mime, job.question.as_deref()) => result,
            () = cancel.cancelled() => {
                tracing::debug!(job_id = %job.job_id, "vision analysis canceled");
                return;
            }
        };

        let result = match analysis {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "vision provider failed");
                job.status = ImageJobStatus::Failed;
                self.reply_sink
                    .deliver_vision_reply(
                        &job.session_id,
                        &job.device_id,
                        &job.job_id,
                        "I couldn't make sense of that image. Could you try again?",
                        None,
                    )
                    .await;
                return;
            }
        };

        let recorded_at = Utc::now();
        let record = LifelogImageRecord {
            job_id: job.job_id.clone(),
            session_id: job.session_id.clone(),
            content_hash,
            dhash,
            asset_uri,
            recorded_at,
        };
        if let Err(e) = self.store.insert_lifelog_image(record).await {
            tracing::error!(job_id = %job.job_id, error = %e, "failed to persist lifelog image record");
        }

        let context = LifelogContext {
            job_id: job.job_id.clone(),
            session_id: job.session_id.clone(),
            summary: result.summary.clone(),
            structured: serde_json::to_value(&result).unwrap_or(serde_json::Value::Null),
            recorded_at,
        };
        if let Err(e) = self.store.insert_lifelog_context(context).await {
            tracing::error!(job_id = %job.job_id, error = %e, "failed to persist lifelog context");
        }

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("session_id".to_string(), job.session_id.clone());
        metadata.insert("job_id".to_string(), job.job_id.clone());
        if let Err(e) = self.vector_index.add(&job.job_id, &result.summary, metadata).await {
            tracing::warn!(job_id = %job.job_id, error = %e, "failed to index vision summary");
        }

        job.status = ImageJobStatus::Done;
        let reply_text = reply_text_for(&result);
        self.reply_sink
            .deliver_vision_reply(&job.session_id, &job.device_id, &job.job_id, &reply_text, result.risk_level)
            .await;
    }
}

#[async_trait]
impl ImageJobProcessor for VisionPipeline {
    async fn process(&self, job: ImageJob, cancel: CancellationToken) {
        self.run(job, cancel).await;
    }
}

/// Prefers the provider's own actionable phrasing; falls back to the raw
/// summary when the provider didn't supply one (spec §4.8 step 4).
fn reply_text_for(result: &VisionResult) -> String {
    result
        .actionable_summary
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| result.summary.clone())
}

fn mime_extension(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// 8x8 adjacent-pixel difference hash over a 9x8 grayscale downsample.
fn compute_dhash(bytes: &[u8]) -> Result<u64, VisionPipelineError> {
    let image = image::load_from_memory(bytes).map_err(|e| VisionPipelineError::Decode(e.to_string()))?;
    let small = image.resize_exact(9, 8, FilterType::Triangle).to_luma8();

    let mut hash: u64 = 0;
    for y in 0..8u32 {
        for x in 0..8u32 {
            let left = small.get_pixel(x, y)[0];
            let right = small.get_pixel(x + 1, y)[0];
            hash <<= 1;
            if left > right {
                hash |= 1;
            }
        }
    }
    Ok(hash)
}

fn compute_content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}

#[must_use]
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_distance_of_identical_hashes_is_zero() {
        assert_eq!(hamming_distance(0xABCD, 0xABCD), 0);
    }

    #[test]
    fn hamming_distance_counts_differing_bits() {
        assert_eq!(hamming_distance(0b0000, 0b1111), 4);
    }

    #[test]
    fn reply_prefers_actionable_summary() {
        let result = VisionResult {
            summary: "a street".to_string(),
            actionable_summary: Some("step off the curb ahead".to_string()),
            ..Default::default()
        };
        assert_eq!(reply_text_for(&result), "step off the curb ahead");
    }

    #[test]
    fn reply_falls_back_to_summary_when_actionable_is_blank() {
        let result = VisionResult {
            summary: "a street".to_string(),
            actionable_summary: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(reply_text_for(&result), "a street");
    }
}

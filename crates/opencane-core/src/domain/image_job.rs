//! [`ImageJob`]: one queued image awaiting vision processing (spec §3, §4.8).
//! Owned by the Ingest Queue worker that dequeues it until handed to the
//! `Store`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageJobStatus {
    Queued,
    Processing,
    Done,
    Deduped,
    Rejected,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ImageJob {
    pub job_id: String,
    pub session_id: String,
    pub device_id: String,
    pub bytes: Vec<u8>,
    pub mime: String,
    pub question: Option<String>,
    pub enqueued_at: DateTime<Utc>,

    /// Perceptual dHash, populated once computed (spec §4.8 step 2).
    pub dhash: Option<u64>,
    pub status: ImageJobStatus,
}

impl ImageJob {
    #[must_use]
    pub fn new(
        job_id: String,
        session_id: String,
        device_id: String,
        bytes: Vec<u8>,
        mime: String,
        question: Option<String>,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            session_id,
            device_id,
            bytes,
            mime,
            question,
            enqueued_at,
            dhash: None,
            status: ImageJobStatus::Queued,
        }
    }
}

//! `VectorIndex` (spec §6.4). Internals are out of scope (spec §1); only the
//! add/query capability is consumed here.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("vector index error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn add(
        &self,
        id: &str,
        text: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), VectorIndexError>;

    async fn query(
        &self,
        text: &str,
        filters: &BTreeMap<String, String>,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, VectorIndexError>;
}

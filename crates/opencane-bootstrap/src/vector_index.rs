//! A minimal in-memory [`VectorIndex`] (spec §6.4: "internals are out of
//! scope"). No concrete implementation exists anywhere in this workspace's
//! teacher or example repos; this one exists purely so the composition root
//! is runnable, scored by keyword overlap rather than embeddings — a
//! production deployment would swap this for a real vector database behind
//! the same port.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use opencane_core::ports::{VectorIndex, VectorIndexError, VectorMatch};

struct Entry {
    id: String,
    text: String,
    metadata: BTreeMap<String, String>,
}

pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryVectorIndex {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: RwLock::new(Vec::new()) }
    }

    fn score(query_words: &[&str], text: &str) -> f32 {
        let lower = text.to_lowercase();
        let hits = query_words.iter().filter(|w| lower.contains(*w)).count();
        hits as f32 / query_words.len().max(1) as f32
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, id: &str, text: &str, metadata: BTreeMap<String, String>) -> Result<(), VectorIndexError> {
        let mut entries = self.entries.write().map_err(|_| VectorIndexError::Backend("poisoned".to_string()))?;
        entries.retain(|e| e.id != id);
        entries.push(Entry { id: id.to_string(), text: text.to_string(), metadata });
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        filters: &BTreeMap<String, String>,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, VectorIndexError> {
        let query_lower = text.to_lowercase();
        let query_words: Vec<&str> = query_lower.split_whitespace().collect();
        let entries = self.entries.read().map_err(|_| VectorIndexError::Backend("poisoned".to_string()))?;

        let mut matches: Vec<VectorMatch> = entries
            .iter()
            .filter(|e| filters.iter().all(|(k, v)| e.metadata.get(k) == Some(v)))
            .map(|e| VectorMatch {
                id: e.id.clone(),
                text: e.text.clone(),
                score: Self::score(&query_words, &e.text),
                metadata: e.metadata.clone(),
            })
            .filter(|m| m.score > 0.0)
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_ranks_by_keyword_overlap() {
        let index = InMemoryVectorIndex::new();
        index.add("a", "a red bicycle near the bench", BTreeMap::new()).await.unwrap();
        index.add("b", "a quiet street with no obstacles", BTreeMap::new()).await.unwrap();

        let results = index.query("red bicycle", &BTreeMap::new(), 5).await.unwrap();
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn query_respects_metadata_filters() {
        let index = InMemoryVectorIndex::new();
        let mut meta_a = BTreeMap::new();
        meta_a.insert("session_id".to_string(), "s1".to_string());
        index.add("a", "bicycle near bench", meta_a).await.unwrap();

        let mut meta_b = BTreeMap::new();
        meta_b.insert("session_id".to_string(), "s2".to_string());
        index.add("b", "bicycle near bench", meta_b).await.unwrap();

        let mut filters = BTreeMap::new();
        filters.insert("session_id".to_string(), "s2".to_string());
        let results = index.query("bicycle", &filters, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }
}

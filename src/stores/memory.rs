//! In-memory store with brute-force cosine search, for tests and dry runs.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{EmbeddingRecord, SearchHit, VectorStore};
use crate::types::PipelineError;

/// Append-only in-memory [`VectorStore`].
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    rows: Mutex<Vec<EmbeddingRecord>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row, in insertion order.
    pub fn rows(&self) -> Vec<EmbeddingRecord> {
        self.rows.lock().expect("rows mutex poisoned").clone()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), PipelineError> {
        self.rows.lock().expect("rows mutex poisoned").push(record);
        Ok(())
    }

    async fn query_nearest(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let rows = self.rows.lock().expect("rows mutex poisoned");
        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| SearchHit {
                folder: row.folder.clone(),
                content: row.content.clone(),
                distance: cosine_distance(embedding, &row.embedding),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, PipelineError> {
        Ok(self.rows.lock().expect("rows mutex poisoned").len())
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(folder: &str, content: &str, embedding: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            folder: folder.to_string(),
            content: content.to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn nearest_neighbors_come_back_distance_ascending() {
        let store = MemoryVectorStore::new();
        store
            .upsert(record("a", "aligned", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(record("b", "orthogonal", vec![0.0, 1.0]))
            .await
            .unwrap();
        store
            .upsert(record("c", "opposite", vec![-1.0, 0.0]))
            .await
            .unwrap();

        let hits = store.query_nearest(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "aligned");
        assert_eq!(hits[1].content, "orthogonal");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn duplicate_content_is_not_deduplicated() {
        let store = MemoryVectorStore::new();
        let row = record("a", "same text", vec![1.0, 0.0]);
        store.upsert(row.clone()).await.unwrap();
        store.upsert(row).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }
}

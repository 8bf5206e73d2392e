//! Vector-store backends for enriched chunk embeddings.
//!
//! The [`VectorStore`] trait is the pipeline's only view of persistence:
//! append a `{folder, content, embedding}` row, query nearest neighbors,
//! count rows. The store owns row identity; the pipeline only appends, so
//! duplicate content across reruns produces duplicate rows unless an
//! external uniqueness constraint says otherwise.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteEmbeddingStore;

/// One persisted row: an enriched chunk and its embedding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub folder: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A nearest-neighbor match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub folder: String,
    pub content: String,
    /// Cosine distance to the query vector; smaller is closer.
    pub distance: f32,
}

/// Storage capability consumed by the populate stage.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Appends a record. Inserts may arrive in any order relative to each
    /// other and must not be deduplicated by content.
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), PipelineError>;

    /// Returns up to `limit` rows ordered by cosine distance ascending.
    async fn query_nearest(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError>;

    /// Total number of stored rows.
    async fn count(&self) -> Result<usize, PipelineError>;
}

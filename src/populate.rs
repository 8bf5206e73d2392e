//! Bounded-concurrency embedding and vector-store population.
//!
//! Every enriched chunk becomes one task on a `JoinSet`. Tasks are spawned
//! eagerly but each must acquire a permit from one shared semaphore before
//! calling the embedding capability, capping total external API pressure
//! across the whole dataset rather than per folder. The permit is held
//! through the insert and released when the task finishes on any path.
//! The first failure aborts every sibling still in flight and surfaces as
//! the single outcome of the call; rows already written stay written.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::enrichment::FolderEnriched;
use crate::stores::{EmbeddingRecord, VectorStore};
use crate::types::PipelineError;

/// Outcome of a successful populate call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PopulateSummary {
    /// Rows written to the vector store.
    pub inserted: usize,
}

/// Fans enriched chunks out to the embedding capability and the store.
pub struct EmbeddingPopulator {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    max_in_flight: usize,
}

impl EmbeddingPopulator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            max_in_flight,
        }
    }

    /// Embeds and inserts every chunk of every folder.
    ///
    /// At most `max_in_flight` embedding+insert operations run at once. If
    /// any task fails, the remaining tasks are cancelled and the call
    /// returns that failure; the store may retain rows from tasks that
    /// completed before the failure.
    pub async fn populate(
        &self,
        folders: &[FolderEnriched],
    ) -> Result<PopulateSummary, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks: JoinSet<Result<(), PipelineError>> = JoinSet::new();

        for folder in folders {
            for chunk in &folder.chunks {
                let content = chunk.merged();
                let folder_name = folder.folder.clone();
                let semaphore = Arc::clone(&semaphore);
                let embedder = Arc::clone(&self.embedder);
                let store = Arc::clone(&self.store);
                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| PipelineError::Task("embedding semaphore closed".into()))?;
                    debug!(folder = %folder_name, "populating");
                    let embedding = embedder.embed(&content).await?;
                    store
                        .upsert(EmbeddingRecord {
                            folder: folder_name,
                            content,
                            embedding,
                        })
                        .await
                });
            }
        }

        let total = tasks.len();
        let mut inserted = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => inserted += 1,
                Ok(Err(err)) => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(err);
                }
                Err(join_err) => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(PipelineError::Task(join_err.to_string()));
                }
            }
        }

        info!(inserted, total, "vector store population complete");
        Ok(PopulateSummary { inserted })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::enrichment::EnrichedChunk;
    use crate::stores::MemoryVectorStore;

    fn enriched(folder: &str, contents: &[&str]) -> FolderEnriched {
        FolderEnriched {
            folder: folder.to_string(),
            chunks: contents
                .iter()
                .enumerate()
                .map(|(i, content)| EnrichedChunk {
                    folder: folder.to_string(),
                    sequence_index: i,
                    context: format!("ctx {i}"),
                    content: (*content).to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn in_flight_calls_never_exceed_the_permit_count() {
        let embedder = Arc::new(MockEmbeddingProvider::new().with_delay(Duration::from_millis(20)));
        let store = Arc::new(MemoryVectorStore::new());
        let populator = EmbeddingPopulator::new(embedder.clone(), store.clone(), 3);

        let folders = vec![
            enriched("a", &["c0", "c1", "c2", "c3", "c4"]),
            enriched("b", &["c5", "c6", "c7", "c8", "c9"]),
        ];
        let summary = populator.populate(&folders).await.unwrap();

        assert_eq!(summary.inserted, 10);
        assert_eq!(store.count().await.unwrap(), 10);
        assert!(
            embedder.peak_in_flight() <= 3,
            "peak in-flight {} exceeded permit count",
            embedder.peak_in_flight()
        );
    }

    #[tokio::test]
    async fn one_failure_fails_the_whole_call_and_keeps_earlier_rows_only() {
        let embedder = Arc::new(MockEmbeddingProvider::failing_on("poison"));
        let store = Arc::new(MemoryVectorStore::new());
        let populator = EmbeddingPopulator::new(embedder, store.clone(), 10);

        let folders = vec![enriched("a", &["c0", "c1", "poison", "c3", "c4"])];
        let err = populator.populate(&folders).await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));

        let rows = store.count().await.unwrap();
        assert!(rows <= 4, "expected at most 4 rows, found {rows}");
        for row in store.rows() {
            assert!(!row.content.contains("poison"));
        }
    }

    #[tokio::test]
    async fn records_carry_the_merged_text_and_folder() {
        let embedder = Arc::new(MockEmbeddingProvider::new());
        let store = Arc::new(MemoryVectorStore::new());
        let populator = EmbeddingPopulator::new(embedder, store.clone(), 2);

        populator
            .populate(&[enriched("src", &["chunk body"])])
            .await
            .unwrap();

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].folder, "src");
        assert_eq!(rows[0].content, "ctx 0\nchunk body");
        assert!(!rows[0].embedding.is_empty());
    }

    #[tokio::test]
    async fn empty_input_populates_nothing() {
        let populator = EmbeddingPopulator::new(
            Arc::new(MockEmbeddingProvider::new()),
            Arc::new(MemoryVectorStore::new()),
            4,
        );
        let summary = populator.populate(&[]).await.unwrap();
        assert_eq!(summary.inserted, 0);
    }
}

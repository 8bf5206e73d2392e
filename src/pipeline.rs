//! End-to-end orchestration: aggregate, enrich, populate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::aggregation::{FolderChunks, aggregate_source};
use crate::artifacts;
use crate::config::PipelineConfig;
use crate::embedding::EmbeddingProvider;
use crate::enrichment::{EnrichmentScheduler, Summarizer};
use crate::populate::EmbeddingPopulator;
use crate::stores::VectorStore;
use crate::tokenizer::TokenCounter;
use crate::types::PipelineError;

/// Final run summary reported to the caller.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub folders: usize,
    pub chunks: usize,
    pub inserted: usize,
    pub duration: Duration,
}

/// Where to persist intermediate artifacts between stages.
#[derive(Clone, Debug)]
pub struct ArtifactPaths {
    pub chunks: PathBuf,
    pub enriched: PathBuf,
}

impl ArtifactPaths {
    /// `data_chunks.json` and `final_data.json` under one directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            chunks: dir.join("data_chunks.json"),
            enriched: dir.join("final_data.json"),
        }
    }
}

/// Owns the configuration and capability handles for one pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    counter: Arc<dyn TokenCounter>,
    summarizer: Arc<dyn Summarizer>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs all three stages over a serialized source tree.
    pub async fn run(&self, source: &str) -> Result<PipelineReport, PipelineError> {
        self.run_inner(source, None).await
    }

    /// Like [`run`](Self::run), but persists the chunked and enriched
    /// folder maps between stages.
    pub async fn run_with_artifacts(
        &self,
        source: &str,
        paths: &ArtifactPaths,
    ) -> Result<PipelineReport, PipelineError> {
        self.run_inner(source, Some(paths)).await
    }

    async fn run_inner(
        &self,
        source: &str,
        artifact_paths: Option<&ArtifactPaths>,
    ) -> Result<PipelineReport, PipelineError> {
        self.config.validate()?;
        let start = Instant::now();

        let groups = aggregate_source(
            source,
            self.counter.as_ref(),
            self.config.max_tokens_per_group,
        )?;
        let chunk_total = total_chunks(&groups);
        info!(
            folders = groups.len(),
            chunks = chunk_total,
            "aggregation complete"
        );
        if let Some(paths) = artifact_paths {
            artifacts::save_folder_map(&paths.chunks, &artifacts::chunk_contents(&groups)).await?;
        }

        let scheduler = EnrichmentScheduler::new(Arc::clone(&self.summarizer), &self.config);
        let enriched = scheduler.enrich(&groups).await?;
        info!(folders = enriched.len(), "enrichment complete");
        if let Some(paths) = artifact_paths {
            artifacts::save_folder_map(&paths.enriched, &artifacts::enriched_contents(&enriched))
                .await?;
        }

        let populator = EmbeddingPopulator::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.store),
            self.config.max_concurrent_embeddings,
        );
        let summary = populator.populate(&enriched).await?;

        let report = PipelineReport {
            folders: groups.len(),
            chunks: chunk_total,
            inserted: summary.inserted,
            duration: start.elapsed(),
        };
        info!(
            folders = report.folders,
            chunks = report.chunks,
            inserted = report.inserted,
            duration_ms = report.duration.as_millis() as u64,
            "pipeline run complete"
        );
        Ok(report)
    }
}

fn total_chunks(groups: &[FolderChunks]) -> usize {
    groups.iter().map(|group| group.chunks.len()).sum()
}

/// Builder wiring the pipeline's capabilities together.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    counter: Option<Arc<dyn TokenCounter>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn VectorStore>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    #[must_use]
    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validates the configuration and checks every capability is wired.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(Pipeline {
            config,
            counter: self
                .counter
                .ok_or_else(|| missing_capability("token counter"))?,
            summarizer: self
                .summarizer
                .ok_or_else(|| missing_capability("summarizer"))?,
            embedder: self
                .embedder
                .ok_or_else(|| missing_capability("embedder"))?,
            store: self
                .store
                .ok_or_else(|| missing_capability("vector store"))?,
        })
    }
}

fn missing_capability(name: &str) -> PipelineError {
    PipelineError::Configuration(format!("pipeline requires a {name}"))
}

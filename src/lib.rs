//! Token-budgeted corpus preprocessing for retrieval-augmented generation.
//!
//! ```text
//! Serialized source tree ──► aggregation::split_source_document
//!                                         │
//!                                         ▼
//!                            aggregation::aggregate_by_token ──► FolderChunks
//!                                         │
//!                                         ▼
//!                  enrichment::EnrichmentScheduler (TPM window) ──► FolderEnriched
//!                                         │
//!                                         ▼
//!                  populate::EmbeddingPopulator (bounded fan-out)
//!                                         │
//!                                         ▼
//!                  stores::VectorStore ──► nearest-neighbor retrieval
//! ```
//!
//! The summarization and embedding capabilities, the tokenizer, and the
//! vector store are trait seams ([`Summarizer`], [`EmbeddingProvider`],
//! [`TokenCounter`], [`VectorStore`]) with rig-core backed implementations
//! and deterministic mocks for testing. [`Pipeline`] wires the stages
//! together and reports progress through `tracing`.

pub mod aggregation;
pub mod artifacts;
pub mod config;
pub mod embedding;
pub mod enrichment;
pub mod pipeline;
pub mod populate;
pub mod stores;
pub mod tokenizer;
pub mod types;

pub use aggregation::{Chunk, FolderChunks};
pub use config::PipelineConfig;
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider, RigEmbedder};
pub use enrichment::{
    EnrichedChunk, EnrichmentScheduler, FolderEnriched, MockSummarizer, RigSummarizer, Summarizer,
};
pub use pipeline::{ArtifactPaths, Pipeline, PipelineReport};
pub use populate::{EmbeddingPopulator, PopulateSummary};
pub use stores::{EmbeddingRecord, MemoryVectorStore, SearchHit, SqliteEmbeddingStore, VectorStore};
pub use tokenizer::{TokenCounter, WordCounter};
pub use types::PipelineError;

#[cfg(feature = "tiktoken-counter")]
pub use tokenizer::TiktokenCounter;

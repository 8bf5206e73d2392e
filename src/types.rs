//! Shared error taxonomy for the preprocessing pipeline.
//!
//! Configuration problems abort before any work starts. Capability failures
//! (summarization, embedding) carry the upstream message and surface per
//! chunk; the enrichment variant wraps them with the folder and chunk index
//! so callers can tell which unit failed. Rate-limit pauses are not errors
//! and are reported through `tracing` instead.

use thiserror::Error;

/// Errors produced by the chunking, enrichment, and populate stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid thresholds or missing pipeline wiring. Fatal before any work.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A file could not be tokenized or split within the group budget.
    #[error("aggregation failed: {0}")]
    Aggregation(String),

    /// The summarization capability failed after exhausting its own retries.
    #[error("summarization capability failed: {0}")]
    Capability(String),

    /// A capability failure attributed to one chunk of one folder.
    #[error("enrichment failed for chunk {index} of folder '{folder}': {source}")]
    Enrichment {
        folder: String,
        index: usize,
        #[source]
        source: Box<PipelineError>,
    },

    /// The embedding capability failed.
    #[error("embedding capability failed: {0}")]
    Embedding(String),

    /// The vector store rejected an operation.
    #[error("vector store failure: {0}")]
    Storage(String),

    /// A spawned worker panicked or was torn down unexpectedly.
    #[error("worker task failed: {0}")]
    Task(String),

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(String),
}

impl PipelineError {
    /// Wraps a per-chunk failure with the folder and index it belongs to.
    pub fn for_chunk(folder: impl Into<String>, index: usize, source: PipelineError) -> Self {
        PipelineError::Enrichment {
            folder: folder.into(),
            index,
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

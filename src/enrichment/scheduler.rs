//! Per-folder scheduling of summarization under a fixed-window token budget.
//!
//! Folders whose chunk token sum fits the tokens-per-minute budget are
//! fanned out concurrently; folders that alone exceed it are deferred to a
//! strictly sequential pass that throttles per chunk. Both paths share one
//! [`TokenWindow`], owned by the scheduling call. The window pause is a
//! non-blocking delay awaited by the scheduling task only.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregation::{Chunk, FolderChunks};
use crate::config::PipelineConfig;
use crate::types::PipelineError;

use super::summarizer::Summarizer;

/// A chunk paired with its generated context summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedChunk {
    pub folder: String,
    pub sequence_index: usize,
    pub context: String,
    pub content: String,
}

impl EnrichedChunk {
    /// Text handed to the embedding stage: summary first, verbatim chunk
    /// after, so retrieval sees both.
    pub fn merged(&self) -> String {
        format!("{}\n{}", self.context, self.content)
    }
}

/// Ordered enriched-chunk list for one folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEnriched {
    pub folder: String,
    pub chunks: Vec<EnrichedChunk>,
}

impl FolderEnriched {
    pub fn merged_contents(&self) -> Vec<String> {
        self.chunks.iter().map(EnrichedChunk::merged).collect()
    }
}

/// Dispatch decision made once per folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FolderPlan {
    /// All chunks fan out concurrently after one window reservation.
    Concurrent,
    /// The folder alone exceeds the budget; each chunk is processed one at
    /// a time with its own window reservation.
    Sequential,
}

/// Picks the plan for a folder given its total token count.
pub fn plan_folder(folder_tokens: usize, tokens_per_minute_budget: usize) -> FolderPlan {
    if folder_tokens > tokens_per_minute_budget {
        FolderPlan::Sequential
    } else {
        FolderPlan::Concurrent
    }
}

/// Fixed-window usage counter for the summarization budget.
///
/// When a reservation would push usage past the budget, the window sleeps
/// for the configured pause and resets to zero; bursts that land exactly on
/// the boundary are allowed through. Owned by one scheduling call, mutated
/// sequentially, so no lock is involved.
#[derive(Debug)]
pub struct TokenWindow {
    budget: usize,
    used: usize,
    pause: Duration,
}

impl TokenWindow {
    pub fn new(budget: usize, pause: Duration) -> Self {
        Self {
            budget,
            used: 0,
            pause,
        }
    }

    /// Tokens consumed in the current window.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Accounts for `tokens` of upcoming work, pausing and resetting first
    /// if the window cannot absorb them.
    pub async fn reserve(&mut self, tokens: usize) {
        if self.used + tokens > self.budget {
            info!(
                used = self.used,
                requested = tokens,
                budget = self.budget,
                pause_secs = self.pause.as_secs(),
                "tokens-per-minute budget exhausted, pausing"
            );
            tokio::time::sleep(self.pause).await;
            self.used = 0;
        }
        self.used += tokens;
    }
}

/// Drives summarization for every folder's chunk group.
pub struct EnrichmentScheduler {
    summarizer: Arc<dyn Summarizer>,
    tokens_per_minute_budget: usize,
    rate_limit_pause: Duration,
}

impl EnrichmentScheduler {
    pub fn new(summarizer: Arc<dyn Summarizer>, config: &PipelineConfig) -> Self {
        Self {
            summarizer,
            tokens_per_minute_budget: config.tokens_per_minute_budget,
            rate_limit_pause: config.rate_limit_pause,
        }
    }

    /// Enriches every chunk of every folder.
    ///
    /// Concurrent folders come back in input order, followed by deferred
    /// folders in input order. A summarization failure fails its folder as
    /// a unit; sibling requests still in flight in the same fan-out are
    /// dropped.
    pub async fn enrich(
        &self,
        groups: &[FolderChunks],
    ) -> Result<Vec<FolderEnriched>, PipelineError> {
        let mut window = TokenWindow::new(self.tokens_per_minute_budget, self.rate_limit_pause);
        let mut deferred = Vec::new();
        let mut out = Vec::with_capacity(groups.len());

        for group in groups {
            let folder_tokens = group.total_tokens();
            match plan_folder(folder_tokens, self.tokens_per_minute_budget) {
                FolderPlan::Sequential => {
                    info!(
                        folder = %group.folder,
                        folder_tokens,
                        budget = self.tokens_per_minute_budget,
                        "folder exceeds the per-minute budget, deferring to sequential pass"
                    );
                    deferred.push(group);
                }
                FolderPlan::Concurrent => {
                    window.reserve(folder_tokens).await;
                    debug!(
                        folder = %group.folder,
                        chunks = group.chunks.len(),
                        folder_tokens,
                        "enriching folder concurrently"
                    );
                    let contexts = try_join_all(
                        group
                            .chunks
                            .iter()
                            .map(|chunk| self.summarize_chunk(chunk)),
                    )
                    .await?;
                    out.push(zip_folder(group, contexts));
                }
            }
        }

        for group in deferred {
            info!(
                folder = %group.folder,
                chunks = group.chunks.len(),
                "enriching folder sequentially under per-chunk throttling"
            );
            let mut contexts = Vec::with_capacity(group.chunks.len());
            for (n, chunk) in group.chunks.iter().enumerate() {
                window.reserve(chunk.token_count).await;
                contexts.push(self.summarize_chunk(chunk).await?);
                debug!(
                    folder = %group.folder,
                    done = n + 1,
                    total = group.chunks.len(),
                    "sequential enrichment progress"
                );
            }
            out.push(zip_folder(group, contexts));
        }

        Ok(out)
    }

    async fn summarize_chunk(&self, chunk: &Chunk) -> Result<String, PipelineError> {
        self.summarizer
            .summarize(&chunk.content, &chunk.folder)
            .await
            .map_err(|err| PipelineError::for_chunk(&chunk.folder, chunk.sequence_index, err))
    }
}

fn zip_folder(group: &FolderChunks, contexts: Vec<String>) -> FolderEnriched {
    let chunks = group
        .chunks
        .iter()
        .zip(contexts)
        .map(|(chunk, context)| EnrichedChunk {
            folder: chunk.folder.clone(),
            sequence_index: chunk.sequence_index,
            context,
            content: chunk.content.clone(),
        })
        .collect();
    FolderEnriched {
        folder: group.folder.clone(),
        chunks,
    }
}

//! Folder-scoped, token-budgeted aggregation of a serialized source tree.
//!
//! [`source`] parses the raw dump into per-file entries grouped by their
//! top-level folder; [`packer`] greedily packs consecutive entries into
//! chunk groups that stay within the configured token budget, splitting
//! files that are individually too large into labeled parts.

pub mod packer;
pub mod source;

pub use packer::{Chunk, FolderChunks, aggregate_by_token};
pub use source::{FileEntry, group_by_root_folder, split_source_document};

use crate::tokenizer::TokenCounter;
use crate::types::PipelineError;

/// Parses a source dump and aggregates it in one step.
pub fn aggregate_source(
    raw: &str,
    counter: &dyn TokenCounter,
    max_tokens_per_group: usize,
) -> Result<Vec<FolderChunks>, PipelineError> {
    let entries = split_source_document(raw);
    if entries.is_empty() {
        return Err(PipelineError::Aggregation(
            "no file markers found in source document".into(),
        ));
    }
    let grouped = group_by_root_folder(entries);
    aggregate_by_token(&grouped, counter, max_tokens_per_group)
}

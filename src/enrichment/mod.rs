//! Contextual enrichment of chunk groups under a tokens-per-minute budget.
//!
//! [`summarizer`] defines the summarization capability seam and the
//! rig-core backed implementation; [`scheduler`] decides per folder between
//! a concurrent fan-out and a throttled sequential fallback, pacing both
//! with a fixed-window token limiter.

pub mod scheduler;
pub mod summarizer;

pub use scheduler::{EnrichedChunk, EnrichmentScheduler, FolderEnriched, FolderPlan, TokenWindow};
pub use summarizer::{CONTEXT_PREAMBLE, MockSummarizer, RigSummarizer, Summarizer};

//! Summarization capability seam.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rig::agent::Agent;
use rig::completion::{CompletionModel, Prompt};
use tracing::warn;

use crate::types::PipelineError;

/// Suggested agent preamble for the contextual summaries this pipeline
/// expects: a short description (under 200 characters) of which files a
/// fragment covers and what it is about. Fragments are either a
/// concatenation of files with visible transition markers or one part of
/// an oversized file labeled `Part (m/n)`.
pub const CONTEXT_PREAMBLE: &str = "\
You receive fragments of a serialized source tree. A fragment is either a \
concatenation of several files, with `===== path =====` marker lines at \
each transition, or a single large file split into parts whose marker line \
carries a `Part (m/n)` label. Reply in under 200 characters with the \
context this fragment appears in: which files and subdirectories it \
covers and the main topics and technologies it addresses.";

/// External capability that produces a short contextual summary for one
/// chunk, given the root folder it belongs to. Implementations own their
/// retry policy; a returned error means retries are exhausted.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, content: &str, folder: &str) -> Result<String, PipelineError>;
}

/// [`Summarizer`] backed by a rig-core completion agent.
///
/// The folder name is prepended to every prompt so the model knows where
/// in the tree the fragment lives. Transient failures are retried a fixed
/// number of times before surfacing as a capability error.
pub struct RigSummarizer<M: CompletionModel> {
    agent: Agent<M>,
    max_retries: usize,
}

impl<M: CompletionModel> RigSummarizer<M> {
    pub fn new(agent: Agent<M>) -> Self {
        Self {
            agent,
            max_retries: 2,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl<M: CompletionModel> Summarizer for RigSummarizer<M> {
    async fn summarize(&self, content: &str, folder: &str) -> Result<String, PipelineError> {
        let prompt = format!("The text belongs to the root folder '{folder}'.\n\n{content}");
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.agent.prompt(prompt.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(folder, attempt, error = %err, "summarization attempt failed");
                    last_error = Some(err);
                }
            }
        }
        Err(PipelineError::Capability(
            last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "summarization failed".into()),
        ))
    }
}

/// Deterministic summarizer for tests: echoes the folder name, counts
/// calls, and optionally fails on chunks containing a trigger substring.
#[derive(Debug, Default)]
pub struct MockSummarizer {
    calls: AtomicUsize,
    fail_on: Option<String>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails any chunk whose content contains `trigger`.
    #[must_use]
    pub fn failing_on(trigger: impl Into<String>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: Some(trigger.into()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, content: &str, folder: &str) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(trigger) = &self.fail_on {
            if content.contains(trigger.as_str()) {
                return Err(PipelineError::Capability(format!(
                    "mock refuses content containing '{trigger}'"
                )));
            }
        }
        Ok(format!("[context for folder '{folder}']"))
    }
}

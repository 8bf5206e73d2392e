//! Embedding capability seam.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rig::embeddings::EmbeddingModel;

use crate::types::PipelineError;

/// External capability turning text into an embedding vector. Retries are
/// the capability's own concern; a returned error is final.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;
}

/// [`EmbeddingProvider`] backed by any rig-core embedding model.
#[derive(Clone)]
pub struct RigEmbedder<M: EmbeddingModel> {
    model: M,
}

impl<M: EmbeddingModel> RigEmbedder<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

#[async_trait]
impl<M> EmbeddingProvider for RigEmbedder<M>
where
    M: EmbeddingModel + Send + Sync,
{
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let embeddings = self
            .model
            .embed_texts(vec![text.to_string()])
            .await
            .map_err(|err| PipelineError::Embedding(err.to_string()))?;
        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Embedding("model returned no embedding".into()))?;
        Ok(embedding.vec.into_iter().map(|value| value as f32).collect())
    }
}

/// Deterministic hash-based embedder for tests.
///
/// Tracks how many calls are in flight at once so tests can assert the
/// populate stage's concurrency bound; an optional per-call delay forces
/// calls to overlap, and an optional trigger substring injects failures.
#[derive(Debug, Default)]
pub struct MockEmbeddingProvider {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    delay: Option<Duration>,
    fail_on: Option<String>,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails any text containing `trigger`.
    #[must_use]
    pub fn failing_on(trigger: impl Into<String>) -> Self {
        Self {
            fail_on: Some(trigger.into()),
            ..Self::default()
        }
    }

    /// Highest number of simultaneously in-flight calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = async {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(trigger) = &self.fail_on {
                if text.contains(trigger.as_str()) {
                    return Err(PipelineError::Embedding(format!(
                        "mock refuses text containing '{trigger}'"
                    )));
                }
            }
            Ok(hash_to_vec(text))
        }
        .await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn hash_to_vec(text: &str) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let seed = hasher.finish();
    (0..8)
        .map(|i| {
            let bits = seed.rotate_left((i * 8) as u32) ^ ((i as u64) << 24);
            (bits as f32) / u32::MAX as f32
        })
        .collect()
}

//! Pipeline configuration surface.
//!
//! All thresholds are expressed in tokens as counted by the configured
//! [`TokenCounter`](crate::tokenizer::TokenCounter). Defaults mirror the
//! limits of a mid-tier hosted model: 1600-token chunk groups, a 40k
//! tokens-per-minute summarization budget, and ten concurrent embedding
//! calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Recognized knobs for a pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum token count for one aggregated chunk group.
    pub max_tokens_per_group: usize,
    /// Fixed-window tokens-per-minute budget for the summarization service.
    pub tokens_per_minute_budget: usize,
    /// Maximum simultaneously in-flight embedding + insert operations.
    pub max_concurrent_embeddings: usize,
    /// How long to pause when the per-minute budget is exhausted.
    #[serde(with = "duration_secs")]
    pub rate_limit_pause: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_group: 1600,
            tokens_per_minute_budget: 40_000,
            max_concurrent_embeddings: 10,
            rate_limit_pause: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn with_max_tokens_per_group(mut self, tokens: usize) -> Self {
        self.max_tokens_per_group = tokens;
        self
    }

    #[must_use]
    pub fn with_tokens_per_minute_budget(mut self, tokens: usize) -> Self {
        self.tokens_per_minute_budget = tokens;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_embeddings(mut self, limit: usize) -> Self {
        self.max_concurrent_embeddings = limit;
        self
    }

    #[must_use]
    pub fn with_rate_limit_pause(mut self, pause: Duration) -> Self {
        self.rate_limit_pause = pause;
        self
    }

    /// Reads overrides from `RAGPREP_*` environment variables on top of the
    /// defaults, honoring a `.env` file when present.
    pub fn from_env() -> Result<Self, PipelineError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        if let Some(value) = env_usize("RAGPREP_MAX_TOKENS_PER_GROUP")? {
            config.max_tokens_per_group = value;
        }
        if let Some(value) = env_usize("RAGPREP_TOKENS_PER_MINUTE")? {
            config.tokens_per_minute_budget = value;
        }
        if let Some(value) = env_usize("RAGPREP_MAX_CONCURRENT_EMBEDDINGS")? {
            config.max_concurrent_embeddings = value;
        }
        if let Some(value) = env_usize("RAGPREP_RATE_LIMIT_PAUSE_SECONDS")? {
            config.rate_limit_pause = Duration::from_secs(value as u64);
        }
        config.validate()?;
        Ok(config)
    }

    /// Rejects thresholds that would make the pipeline unable to do any work.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_tokens_per_group == 0 {
            return Err(PipelineError::Configuration(
                "max_tokens_per_group must be greater than zero".into(),
            ));
        }
        if self.tokens_per_minute_budget == 0 {
            return Err(PipelineError::Configuration(
                "tokens_per_minute_budget must be greater than zero".into(),
            ));
        }
        if self.max_concurrent_embeddings == 0 {
            return Err(PipelineError::Configuration(
                "max_concurrent_embeddings must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> Result<Option<usize>, PipelineError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|err| PipelineError::Configuration(format!("{name}='{raw}': {err}"))),
        Err(_) => Ok(None),
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

//! Token counting for budget decisions.
//!
//! Every budget in the pipeline (group size, tokens-per-minute) is expressed
//! in tokens as counted here, so the same counter must be used for
//! aggregation and scheduling within one run.

use crate::types::PipelineError;

/// Converts text into the token count used for all budget arithmetic.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> Result<usize, PipelineError>;
}

/// Counts whitespace-separated words. Deterministic and dependency-free,
/// intended for tests and offline dry runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> Result<usize, PipelineError> {
        Ok(text.split_whitespace().count())
    }
}

#[cfg(feature = "tiktoken-counter")]
pub use tiktoken::TiktokenCounter;

#[cfg(feature = "tiktoken-counter")]
mod tiktoken {
    use std::sync::OnceLock;

    use tiktoken_rs::CoreBPE;

    use super::TokenCounter;
    use crate::types::PipelineError;

    static BPE: OnceLock<CoreBPE> = OnceLock::new();

    /// Counts tokens with the `cl100k_base` encoding shared by the OpenAI
    /// embedding and chat models this pipeline targets.
    ///
    /// The encoder tables are built once per process and shared.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct TiktokenCounter;

    impl TiktokenCounter {
        fn encoder() -> Result<&'static CoreBPE, PipelineError> {
            if let Some(bpe) = BPE.get() {
                return Ok(bpe);
            }
            let bpe = tiktoken_rs::cl100k_base()
                .map_err(|err| PipelineError::Aggregation(format!("tokenizer init: {err}")))?;
            Ok(BPE.get_or_init(|| bpe))
        }
    }

    impl TokenCounter for TiktokenCounter {
        fn count(&self, text: &str) -> Result<usize, PipelineError> {
            Ok(Self::encoder()?.encode_with_special_tokens(text).len())
        }
    }
}

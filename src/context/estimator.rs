#[cfg(test)]
#[path = "estimator_test.rs"]
mod tests;

use std::sync::Arc;

use eyre::Result;

/// A subword tokenizer able to count the tokens of a string.
pub trait Tokenizer {
    fn count(&self, text: &str) -> Result<usize>;
}

pub type ArcTokenizer = Arc<dyn Tokenizer + Send + Sync>;

/// BPE tokenizer of the hosted model family.
pub struct Tiktoken {
    bpe: tiktoken_rs::CoreBPE,
}

impl Tiktoken {
    /// Loads the encoder of `model`, falling back to cl100k_base for models
    /// tiktoken does not know.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => tiktoken_rs::cl100k_base()
                .map_err(|e| eyre::eyre!("loading cl100k_base encoder: {}", e))?,
        };
        Ok(Self { bpe })
    }
}

impl Tokenizer for Tiktoken {
    fn count(&self, text: &str) -> Result<usize> {
        Ok(self.bpe.encode_with_special_tokens(text).len())
    }
}

/// Approximates token counts. Never fails: when the tokenizer is missing or
/// errors, the estimate degrades to one token per four characters.
#[derive(Clone, Default)]
pub struct TokenEstimator {
    tokenizer: Option<ArcTokenizer>,
}

impl TokenEstimator {
    pub fn new(tokenizer: ArcTokenizer) -> Self {
        Self {
            tokenizer: Some(tokenizer),
        }
    }

    pub fn for_model(model: &str) -> Self {
        match Tiktoken::for_model(model) {
            Ok(tiktoken) => Self::new(Arc::new(tiktoken)),
            Err(err) => {
                log::warn!(
                    "Tokenizer unavailable for model {}, estimating by length: {:#}",
                    model,
                    err
                );
                Self::default()
            }
        }
    }

    pub fn estimate(&self, text: &str) -> usize {
        let tokenizer = match self.tokenizer.as_ref() {
            Some(tokenizer) => tokenizer,
            None => return fallback_estimate(text),
        };

        match tokenizer.count(text) {
            Ok(count) => count,
            Err(err) => {
                log::warn!("Tokenization failed, estimating by length: {:#}", err);
                fallback_estimate(text)
            }
        }
    }
}

pub fn fallback_estimate(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

//! Token counting behind a capability trait.
//!
//! The context assembler only needs `count` and `truncate`, so it is
//! independent of which tokenizer is wired in. [`TiktokenCounter`] uses
//! the BPE of the target completion model, falling back to `cl100k_base`
//! for models tiktoken doesn't know.

use std::sync::Arc;

use anyhow::Result;
use tiktoken_rs::CoreBPE;

pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize;

    /// The longest prefix of `text` that is at most `max_tokens` tokens.
    fn truncate(&self, text: &str, max_tokens: usize) -> String;
}

/// Tokenizer-accurate counter backed by tiktoken.
#[derive(Clone)]
pub struct TiktokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TiktokenCounter {
    /// Counter for `model`, or `cl100k_base` if the model is unknown.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                tracing::debug!(model, "no tokenizer registered for model, using cl100k_base");
                tiktoken_rs::cl100k_base()?
            }
        };
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        // A cut can land inside a multi-byte character; back off until it decodes.
        let mut end = max_tokens;
        while end > 0 {
            if let Ok(prefix) = self.bpe.decode(tokens[..end].to_vec()) {
                return prefix;
            }
            end -= 1;
        }
        String::new()
    }
}

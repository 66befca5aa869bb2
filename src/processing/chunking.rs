//! Paragraph chunking with an optional token budget.
//!
//! Text is split on blank lines (`"\n\n"`), each paragraph is trimmed and empty ones are
//! dropped. When a token budget is configured, paragraphs that exceed it are split further
//! with `semchunk-rs`, counting tokens with the embedding model's BPE from `tiktoken-rs` or,
//! when no encoding can be loaded, with a whitespace counter.

use super::types::{Chunk, ChunkingError};
use anyhow::Error as TokenizerError;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

/// Source label attached when the caller supplies none.
pub const DEFAULT_SOURCE: &str = "upload";

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Counts tokens in a text segment.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Converts raw extracted text into [`Chunk`]s.
#[derive(Clone)]
pub struct Chunker {
    budget: Option<TokenBudget>,
}

#[derive(Clone)]
struct TokenBudget {
    max_tokens: usize,
    counter: TokenCounter,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("max_tokens", &self.max_tokens())
            .finish()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::paragraphs()
    }
}

impl Chunker {
    /// Paragraph-only chunker; no token bound is applied.
    pub const fn paragraphs() -> Self {
        Self { budget: None }
    }

    /// Build a chunker for `embedding_model`, bounding chunks to `max_tokens` when set.
    pub fn new(max_tokens: Option<usize>, embedding_model: &str) -> Result<Self, ChunkingError> {
        match max_tokens {
            None => Ok(Self::paragraphs()),
            Some(max_tokens) => {
                Self::with_token_counter(max_tokens, build_token_counter(embedding_model))
            }
        }
    }

    /// Build a token-bounded chunker around an explicit counter.
    pub fn with_token_counter(
        max_tokens: usize,
        counter: TokenCounter,
    ) -> Result<Self, ChunkingError> {
        if max_tokens == 0 {
            return Err(ChunkingError::InvalidMaxTokens);
        }
        Ok(Self {
            budget: Some(TokenBudget {
                max_tokens,
                counter,
            }),
        })
    }

    /// Configured token budget, if any.
    pub fn max_tokens(&self) -> Option<usize> {
        self.budget.as_ref().map(|budget| budget.max_tokens)
    }

    /// Chunk `text`, labelling every chunk with [`DEFAULT_SOURCE`].
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        self.chunk_with_source(text, DEFAULT_SOURCE)
    }

    /// Chunk `text`, labelling every chunk with `source` (blank labels fall back to
    /// [`DEFAULT_SOURCE`]).
    pub fn chunk_with_source(&self, text: &str, source: &str) -> Vec<Chunk> {
        let source = match source.trim() {
            "" => DEFAULT_SOURCE,
            label => label,
        };

        split_paragraphs(text)
            .into_iter()
            .flat_map(|paragraph| self.bound(paragraph))
            .map(|content| Chunk::with_source(content, source))
            .collect()
    }

    fn bound(&self, paragraph: &str) -> Vec<String> {
        let Some(budget) = &self.budget else {
            return vec![paragraph.to_string()];
        };
        if budget.counter.as_ref()(paragraph) <= budget.max_tokens {
            return vec![paragraph.to_string()];
        }

        let counter = budget.counter.clone();
        let splitter = semchunk_rs::Chunker::new(
            budget.max_tokens,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );
        splitter
            .chunk(paragraph)
            .into_iter()
            .map(|piece| piece.trim().to_string())
            .filter(|piece| !piece.is_empty())
            .collect()
    }
}

/// Split on blank lines, trimming each paragraph and discarding empty ones.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

/// Build a token counter for `model`, degrading to whitespace counting when no BPE loads.
pub fn build_token_counter(model: &str) -> TokenCounter {
    match build_tiktoken_counter(model) {
        Ok(counter) => counter,
        Err(error) => {
            tracing::warn!(
                model,
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            whitespace_token_counter()
        }
    }
}

fn build_tiktoken_counter(model: &str) -> Result<TokenCounter, TokenizerError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = Arc::new(resolve_encoding(target)?);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            match model {
                "cl100k_base" => cl100k_base(),
                "o200k_base" => o200k_base(),
                "p50k_base" => p50k_base(),
                "p50k_edit" => p50k_edit(),
                "r50k_base" | "gpt2" => r50k_base(),
                _ => {
                    tracing::debug!(model, "Using 'cl100k_base' encoding for token counting");
                    cl100k_base()
                }
            }
        }
    }
}

/// Count whitespace-separated words; a non-empty segment without words counts as one.
pub fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

//! Core data types and error definitions for the retrieval pipeline.

use crate::{
    embedding::EmbeddingClientError, store::StoreError,
    summarization::SummarizationClientError,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Metadata key carrying the chunk's provenance label.
pub const SOURCE_KEY: &str = "source";

/// Errors produced while constructing a chunker.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// A token budget of zero can never hold any text.
    #[error("max_tokens must be greater than zero")]
    InvalidMaxTokens,
}

/// Stable discriminant for [`PipelineError`], surfaced to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Raw text could not be obtained from an upload.
    ExtractionFailure,
    /// The embedding model call failed.
    EmbeddingFailure,
    /// The persistent collection could not be read or written.
    StorageFailure,
    /// The summarizer call failed.
    SummarizationFailure,
    /// The chunker could not be configured.
    ChunkingFailure,
    /// The caller supplied unusable input.
    InvalidRequest,
}

impl ErrorKind {
    /// Snake-case label used in JSON error bodies and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExtractionFailure => "extraction_failure",
            Self::EmbeddingFailure => "embedding_failure",
            Self::StorageFailure => "storage_failure",
            Self::SummarizationFailure => "summarization_failure",
            Self::ChunkingFailure => "chunking_failure",
            Self::InvalidRequest => "invalid_request",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors emitted by the retrieval pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Text extraction failed for an uploaded file.
    #[error("Failed to extract text: {0}")]
    Extraction(String),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to embed text: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store rejected a read or write.
    #[error("Vector store request failed: {0}")]
    Storage(#[from] StoreError),
    /// Summarizer failed for one of the windows.
    #[error("Summarization failed: {0}")]
    Summarization(#[from] SummarizationClientError),
    /// Chunker configuration was invalid.
    #[error("Failed to configure chunker: {0}")]
    Chunking(#[from] ChunkingError),
    /// Request was rejected before reaching the pipeline.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl PipelineError {
    /// Classify the error into its taxonomy bucket.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extraction(_) => ErrorKind::ExtractionFailure,
            Self::Embedding(_) => ErrorKind::EmbeddingFailure,
            Self::Storage(_) => ErrorKind::StorageFailure,
            Self::Summarization(_) => ErrorKind::SummarizationFailure,
            Self::Chunking(_) => ErrorKind::ChunkingFailure,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

/// A unit of text plus metadata, the atomic item stored and retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Trimmed, non-empty paragraph text.
    pub content: String,
    /// Metadata persisted with the chunk.
    pub meta: BTreeMap<String, String>,
}

impl Chunk {
    /// Build a chunk tagged with a `source` label.
    pub fn with_source(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            content: content.into(),
            meta,
        }
    }
}

/// Metadata exposed for a retrieved chunk; every other stored key is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitMeta {
    /// Provenance label, `"unknown"` when none was stored.
    pub source: String,
}

/// One ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryHit {
    /// Stored chunk text.
    pub content: String,
    /// Reduced metadata.
    pub meta: HitMeta,
}

/// Result of ingesting one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Number of chunks stored for the document.
    pub chunks: usize,
}

/// Theme summary answered for a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeSummary {
    /// Question the summary was built for.
    pub question: String,
    /// Newline-joined partial summaries.
    pub themes: String,
}

/// Readiness snapshot of the backing collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    /// Collection answering queries.
    pub collection: String,
    /// Records currently stored in it.
    pub records: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_follow_variants() {
        assert_eq!(
            PipelineError::Extraction("bad bytes".into()).kind(),
            ErrorKind::ExtractionFailure
        );
        assert_eq!(
            PipelineError::from(EmbeddingClientError::GenerationFailed("x".into())).kind(),
            ErrorKind::EmbeddingFailure
        );
        assert_eq!(
            PipelineError::from(ChunkingError::InvalidMaxTokens).kind(),
            ErrorKind::ChunkingFailure
        );
        assert_eq!(ErrorKind::StorageFailure.to_string(), "storage_failure");
    }

    #[test]
    fn error_message_embeds_cause() {
        let error = PipelineError::from(EmbeddingClientError::GenerationFailed(
            "model offline".into(),
        ));
        assert!(error.to_string().contains("model offline"));
    }

    #[test]
    fn chunk_with_source_sets_meta() {
        let chunk = Chunk::with_source("alpha", "a.txt");
        assert_eq!(chunk.meta.get(SOURCE_KEY).map(String::as_str), Some("a.txt"));
    }
}

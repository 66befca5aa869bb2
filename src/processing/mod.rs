//! Retrieval pipeline: chunking, ingestion, similarity search, and theme summaries.

pub mod chunking;
mod service;
pub mod themes;
pub mod types;

pub use chunking::{Chunker, DEFAULT_SOURCE};
pub use service::{RetrievalApi, RetrievalService};
pub use types::{
    Chunk, ChunkingError, ErrorKind, HealthSnapshot, HitMeta, IngestOutcome,
    PipelineError, QueryHit, SOURCE_KEY, ThemeSummary,
};

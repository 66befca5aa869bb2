//! Shared types used by the SQLite collection store.

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors returned while interacting with the on-disk store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite rejected a statement or could not open the database.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The database directory could not be prepared.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Stored metadata could not be encoded or decoded.
    #[error("Metadata encoding error: {0}")]
    Metadata(#[from] serde_json::Error),
    /// The collection has not been ensured.
    #[error("Collection '{0}' does not exist")]
    CollectionMissing(String),
    /// A vector's length differs from the collection's fixed dimension.
    #[error("Dimension mismatch in collection '{collection}': expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Collection that rejected the vector.
        collection: String,
        /// Dimension fixed by the collection's first insert.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Zero-length vectors cannot be stored or compared.
    #[error("Embedding must contain at least one value")]
    EmptyEmbedding,
    /// The blocking worker running the statement failed or the connection lock was poisoned.
    #[error("Store worker failed: {0}")]
    Worker(String),
}

/// A record staged for insertion; the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Embedding vector for the document.
    pub embedding: Vec<f32>,
    /// Chunk text.
    pub document: String,
    /// Chunk metadata.
    pub metadata: BTreeMap<String, String>,
    /// SHA-256 hex digest of `document`.
    pub content_hash: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Identifier, unique within the collection and never reused.
    pub id: String,
    /// Embedding vector.
    pub embedding: Vec<f32>,
    /// Chunk text.
    pub document: String,
    /// Chunk metadata.
    pub metadata: BTreeMap<String, String>,
    /// SHA-256 hex digest of `document`.
    pub content_hash: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

/// A record paired with its similarity to a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    /// Matched record.
    pub record: StoredRecord,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

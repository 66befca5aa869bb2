//! Local vector store: SQLite persistence plus embedding-aware insert and query.

pub mod distance;
pub mod sqlite;
pub mod types;

pub use sqlite::{CollectionHandle, Database};
pub use types::{NewRecord, ScoredRecord, StoreError, StoredRecord};

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::processing::{Chunk, HitMeta, PipelineError, QueryHit, SOURCE_KEY};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use time::OffsetDateTime;

/// Source reported for records stored without a `source` metadata key.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Embeds chunks and queries, delegating persistence and ranking to a collection.
#[derive(Clone)]
pub struct VectorStore {
    collection: CollectionHandle,
    embedder: Arc<dyn EmbeddingClient>,
}

impl VectorStore {
    /// Pair a ready collection with the embedding client that fills it.
    pub fn new(collection: CollectionHandle, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            collection,
            embedder,
        }
    }

    /// Name of the backing collection.
    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Embed and persist `chunks`, returning how many records were written.
    ///
    /// Every chunk is embedded before anything is written, so a failing embedding leaves the
    /// collection untouched. An empty batch succeeds with a count of zero.
    pub async fn insert(&self, chunks: Vec<Chunk>) -> Result<usize, PipelineError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self.embedder.generate_embeddings(texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "expected {} vectors, received {}",
                chunks.len(),
                embeddings.len()
            ))
            .into());
        }

        let created_at = current_timestamp_rfc3339();
        let records: Vec<NewRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| NewRecord {
                content_hash: compute_content_hash(&chunk.content),
                embedding,
                document: chunk.content,
                metadata: chunk.meta,
                created_at: created_at.clone(),
            })
            .collect();

        let ids = self.collection.append(records).await?;
        tracing::debug!(
            collection = self.collection.name(),
            count = ids.len(),
            first_id = ids.first().map(String::as_str),
            "Inserted records"
        );
        Ok(ids.len())
    }

    /// Return up to `k` chunks closest to `text`, most similar first.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>, PipelineError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(text).await?;
        let scored = self.collection.nearest(embedding, k).await?;
        tracing::debug!(
            collection = self.collection.name(),
            k,
            hits = scored.len(),
            top_score = scored.first().map(|hit| hit.score),
            "Query answered"
        );
        Ok(scored.into_iter().map(to_query_hit).collect())
    }

    /// Number of records in the backing collection.
    pub async fn count(&self) -> Result<u64, PipelineError> {
        Ok(self.collection.count().await?)
    }

    /// All stored records in insertion order.
    pub async fn records(&self) -> Result<Vec<StoredRecord>, PipelineError> {
        Ok(self.collection.records().await?)
    }
}

fn to_query_hit(scored: ScoredRecord) -> QueryHit {
    let ScoredRecord { mut record, .. } = scored;
    let source = record
        .metadata
        .remove(SOURCE_KEY)
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
    QueryHit {
        content: record.document,
        meta: HitMeta { source },
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    async fn store() -> VectorStore {
        let db = Database::open_in_memory().expect("db");
        let collection = db.ensure_collection("docs").await.expect("collection");
        VectorStore::new(collection, Arc::new(HashEmbeddingClient::new(64)))
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Err(EmbeddingClientError::GenerationFailed("model offline".into()))
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    #[tokio::test]
    async fn round_trip_returns_inserted_chunk() {
        let store = store().await;
        store
            .insert(vec![Chunk::with_source("alpha beta", "a.txt")])
            .await
            .expect("insert");

        let hits = store.query("alpha beta", 1).await.expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "alpha beta");
        assert_eq!(hits[0].meta.source, "a.txt");
    }

    #[tokio::test]
    async fn missing_source_defaults_to_unknown() {
        let store = store().await;
        store
            .insert(vec![Chunk {
                content: "orphan text".into(),
                meta: BTreeMap::new(),
            }])
            .await
            .expect("insert");
        let hits = store.query("orphan text", 5).await.expect("query");
        assert_eq!(hits[0].meta.source, UNKNOWN_SOURCE);
    }

    #[tokio::test]
    async fn empty_insert_is_a_noop() {
        let store = store().await;
        let written = store.insert(Vec::new()).await.expect("insert");
        assert_eq!(written, 0);
        assert_eq!(store.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn query_count_is_bounded_by_k_and_size() {
        let store = store().await;
        let chunks = (0..4)
            .map(|i| Chunk::with_source(format!("paragraph number {i}"), "doc"))
            .collect();
        store.insert(chunks).await.expect("insert");

        assert_eq!(store.query("paragraph", 2).await.expect("k=2").len(), 2);
        assert_eq!(store.query("paragraph", 10).await.expect("k=10").len(), 4);
        assert!(store.query("paragraph", 0).await.expect("k=0").is_empty());
    }

    #[tokio::test]
    async fn empty_collection_answers_nothing() {
        let store = store().await;
        assert!(store.query("anything", 5).await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_is_reported_and_writes_nothing() {
        let db = Database::open_in_memory().expect("db");
        let collection = db.ensure_collection("docs").await.expect("collection");
        let store = VectorStore::new(collection, Arc::new(FailingEmbedder));

        let error = store
            .insert(vec![Chunk::with_source("text", "a.txt")])
            .await
            .expect_err("embedding failure");
        assert_eq!(error.kind(), crate::processing::ErrorKind::EmbeddingFailure);
        assert!(error.to_string().contains("model offline"));
        assert_eq!(store.count().await.expect("count"), 0);
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let hash = compute_content_hash("alpha");
        assert_eq!(hash, compute_content_hash("alpha"));
        assert_eq!(hash.len(), 64);
    }
}

//! Retrieval service coordinating extraction, chunking, the vector store, and summaries.

use crate::{
    context::AppContext,
    extraction::TextExtractor,
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::Chunker,
        themes::{join_contents, summarize_text},
        types::{HealthSnapshot, IngestOutcome, PipelineError, QueryHit, ThemeSummary},
    },
    store::VectorStore,
    summarization::SummarizationClient,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Coordinates the ingest, ask, and theme-summary flows.
///
/// Owns the chunker, vector store, summarizer, and extractor built by the entry point so that
/// the HTTP surface and the CLI reuse the same components. Construct once and share through an
/// `Arc`.
pub struct RetrievalService {
    chunker: Chunker,
    store: VectorStore,
    summarizer: Arc<dyn SummarizationClient>,
    extractor: Arc<dyn TextExtractor>,
    metrics: Arc<PipelineMetrics>,
    default_limit: usize,
}

/// Abstraction over the retrieval pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait RetrievalApi: Send + Sync {
    /// Extract text from an uploaded file and ingest it under the file's name.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: String,
    ) -> Result<IngestOutcome, PipelineError>;

    /// Chunk and store raw text.
    async fn ingest(
        &self,
        text: String,
        source: Option<String>,
    ) -> Result<IngestOutcome, PipelineError>;

    /// Return up to `k` stored chunks most similar to `query`.
    async fn ask(&self, query: String, k: Option<usize>) -> Result<Vec<QueryHit>, PipelineError>;

    /// Summarize the themes of the chunks matching `query`.
    async fn summarize_themes(
        &self,
        query: String,
        k: Option<usize>,
    ) -> Result<ThemeSummary, PipelineError>;

    /// Report the collection's readiness.
    async fn health(&self) -> Result<HealthSnapshot, PipelineError>;

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl RetrievalService {
    /// Build the service from an initialized context.
    pub fn new(context: AppContext) -> Result<Self, PipelineError> {
        let AppContext {
            config,
            collection,
            embedder,
            summarizer,
            extractor,
        } = context;
        let chunker = Chunker::new(config.chunk_max_tokens, &config.embedding_model)?;
        tracing::debug!(max_tokens = ?chunker.max_tokens(), "Chunker configured");

        Ok(Self {
            chunker,
            store: VectorStore::new(collection, embedder),
            summarizer,
            extractor,
            metrics: Arc::new(PipelineMetrics::new()),
            default_limit: config.search_default_limit,
        })
    }

    /// Direct access to the vector store.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Extract, chunk, embed, and store an uploaded file.
    pub async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<IngestOutcome, PipelineError> {
        tracing::info!(filename, bytes = bytes.len(), "Processing upload");
        let text = self.observe(self.extractor.extract(bytes, filename))?;
        self.ingest(&text, filename).await
    }

    /// Chunk `raw_text`, label each chunk with `source_label`, and store the chunks.
    pub async fn ingest(
        &self,
        raw_text: &str,
        source_label: &str,
    ) -> Result<IngestOutcome, PipelineError> {
        let chunks = self.chunker.chunk_with_source(raw_text, source_label);
        let written = self.observe(self.store.insert(chunks).await)?;

        self.metrics.record_document(written as u64);
        tracing::info!(
            collection = self.store.collection_name(),
            source = source_label,
            chunks = written,
            "Document ingested"
        );
        Ok(IngestOutcome { chunks: written })
    }

    /// Return up to `k` chunks most similar to `query`; `None` uses the configured default.
    pub async fn ask(&self, query: &str, k: Option<usize>) -> Result<Vec<QueryHit>, PipelineError> {
        let query = self.observe(validate_query(query))?;
        let k = k.unwrap_or(self.default_limit);
        let hits = self.observe(self.store.query(query, k).await)?;
        self.metrics.record_query();
        tracing::info!(k, hits = hits.len(), "Query served");
        Ok(hits)
    }

    /// Retrieve matches for `query` and summarize their combined text window by window.
    pub async fn summarize_themes(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<ThemeSummary, PipelineError> {
        let hits = self.ask(query, k).await?;
        let combined = join_contents(&hits);
        let themes = self.observe(
            summarize_text(self.summarizer.as_ref(), &combined)
                .await
                .map_err(PipelineError::from),
        )?;
        self.metrics.record_summary();
        tracing::info!(hits = hits.len(), "Themes summarized");
        Ok(ThemeSummary {
            question: query.to_string(),
            themes,
        })
    }

    /// Report the collection name and record count.
    pub async fn health(&self) -> Result<HealthSnapshot, PipelineError> {
        Ok(HealthSnapshot {
            collection: self.store.collection_name().to_string(),
            records: self.store.count().await?,
        })
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn observe<T>(&self, result: Result<T, PipelineError>) -> Result<T, PipelineError> {
        if let Err(error) = &result {
            self.metrics.record_failure();
            tracing::warn!(kind = %error.kind(), error = %error, "Pipeline operation failed");
        }
        result
    }
}

fn validate_query(query: &str) -> Result<&str, PipelineError> {
    if query.trim().is_empty() {
        return Err(PipelineError::InvalidRequest(
            "query must not be empty".into(),
        ));
    }
    Ok(query)
}

#[async_trait]
impl RetrievalApi for RetrievalService {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: String,
    ) -> Result<IngestOutcome, PipelineError> {
        RetrievalService::upload(self, &bytes, &filename).await
    }

    async fn ingest(
        &self,
        text: String,
        source: Option<String>,
    ) -> Result<IngestOutcome, PipelineError> {
        let source = source.unwrap_or_default();
        RetrievalService::ingest(self, &text, &source).await
    }

    async fn ask(&self, query: String, k: Option<usize>) -> Result<Vec<QueryHit>, PipelineError> {
        RetrievalService::ask(self, &query, k).await
    }

    async fn summarize_themes(
        &self,
        query: String,
        k: Option<usize>,
    ) -> Result<ThemeSummary, PipelineError> {
        RetrievalService::summarize_themes(self, &query, k).await
    }

    async fn health(&self) -> Result<HealthSnapshot, PipelineError> {
        RetrievalService::health(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        RetrievalService::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        embedding::{EmbeddingClient, EmbeddingClientError, HashEmbeddingClient},
        extraction::DocumentExtractor,
        processing::{ErrorKind, themes::NO_CONTENT_MESSAGE},
        store::Database,
        summarization::{ExtractiveSummarizer, SummarizationClientError, SummarizationRequest},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SummarizationClient for CountingSummarizer {
        async fn generate_summary(
            &self,
            request: SummarizationRequest,
        ) -> Result<String, SummarizationClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("theme of {} chars", request.text.chars().count()))
        }
    }

    struct BrokenSummarizer;

    #[async_trait]
    impl SummarizationClient for BrokenSummarizer {
        async fn generate_summary(
            &self,
            _request: SummarizationRequest,
        ) -> Result<String, SummarizationClientError> {
            Err(SummarizationClientError::GenerationFailed("gpu lost".into()))
        }
    }

    struct OfflineEmbedder;

    #[async_trait]
    impl EmbeddingClient for OfflineEmbedder {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Err(EmbeddingClientError::ProviderUnavailable("connection refused".into()))
        }

        fn dimension(&self) -> usize {
            32
        }
    }

    async fn service_with(
        embedder: Arc<dyn EmbeddingClient>,
        summarizer: Arc<dyn SummarizationClient>,
    ) -> RetrievalService {
        let db = Database::open_in_memory().expect("db");
        let collection = db.ensure_collection("docs").await.expect("collection");
        let context = AppContext {
            config: Config::default(),
            collection,
            embedder,
            summarizer,
            extractor: Arc::new(DocumentExtractor::default()),
        };
        RetrievalService::new(context).expect("service")
    }

    async fn service() -> RetrievalService {
        service_with(
            Arc::new(HashEmbeddingClient::new(32)),
            Arc::new(ExtractiveSummarizer),
        )
        .await
    }

    #[tokio::test]
    async fn ingest_labels_chunks_with_source() {
        let service = service().await;
        let outcome = service
            .ingest("first paragraph\n\nsecond paragraph", "notes.txt")
            .await
            .expect("ingest");
        assert_eq!(outcome.chunks, 2);

        let hits = service.ask("first paragraph", Some(1)).await.expect("ask");
        assert_eq!(hits[0].content, "first paragraph");
        assert_eq!(hits[0].meta.source, "notes.txt");
        assert_eq!(service.metrics_snapshot().chunks_stored, 2);
    }

    #[tokio::test]
    async fn blank_document_stores_nothing() {
        let service = service().await;
        let outcome = service.ingest("  \n\n  ", "empty.txt").await.expect("ingest");
        assert_eq!(outcome.chunks, 0);
        assert_eq!(service.health().await.expect("health").records, 0);
    }

    #[tokio::test]
    async fn upload_decodes_and_ingests() {
        let service = service().await;
        let outcome = service
            .upload(b"alpha\n\nbeta\n\ngamma", "greek.txt")
            .await
            .expect("upload");
        assert_eq!(outcome.chunks, 3);
    }

    #[tokio::test]
    async fn upload_of_unsupported_file_is_extraction_failure() {
        let service = service().await;
        let error = service
            .upload(b"\x89PNG", "scan.png")
            .await
            .expect_err("image");
        assert_eq!(error.kind(), ErrorKind::ExtractionFailure);
        assert_eq!(service.metrics_snapshot().failures, 1);
    }

    #[tokio::test]
    async fn ask_returns_min_of_k_and_collection_size() {
        let service = service().await;
        let text = (0..60)
            .map(|i| format!("paragraph {i}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        service.ingest(&text, "many.txt").await.expect("ingest");

        assert_eq!(service.ask("paragraph", None).await.expect("default").len(), 5);
        assert_eq!(service.ask("paragraph", Some(60)).await.expect("all").len(), 60);
        assert_eq!(service.ask("paragraph", Some(500)).await.expect("beyond").len(), 60);
        assert!(service.ask("paragraph", Some(0)).await.expect("zero").is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let service = service().await;
        let error = service.ask("   ", None).await.expect_err("blank");
        assert_eq!(error.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn themes_short_circuit_on_empty_collection() {
        let summarizer = Arc::new(CountingSummarizer::default());
        let service =
            service_with(Arc::new(HashEmbeddingClient::new(32)), summarizer.clone()).await;

        let summary = service
            .summarize_themes("what is this about", None)
            .await
            .expect("summary");
        assert_eq!(summary.question, "what is this about");
        assert_eq!(summary.themes, NO_CONTENT_MESSAGE);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn themes_summarize_each_window() {
        let summarizer = Arc::new(CountingSummarizer::default());
        let service =
            service_with(Arc::new(HashEmbeddingClient::new(32)), summarizer.clone()).await;
        let paragraph = "lorem ipsum ".repeat(50);
        let text = vec![paragraph.trim(); 3].join("\n\n");
        service.ingest(&text, "lorem.txt").await.expect("ingest");

        let summary = service
            .summarize_themes("lorem ipsum", Some(3))
            .await
            .expect("summary");
        // Three 599-char hits joined by newlines span two windows.
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(summary.themes.lines().count(), 2);
    }

    #[tokio::test]
    async fn summarizer_failure_is_typed() {
        let service = service_with(
            Arc::new(HashEmbeddingClient::new(32)),
            Arc::new(BrokenSummarizer),
        )
        .await;
        service.ingest("some content", "a.txt").await.expect("ingest");
        let error = service
            .summarize_themes("content", None)
            .await
            .expect_err("summarizer down");
        assert_eq!(error.kind(), ErrorKind::SummarizationFailure);
        assert!(error.to_string().contains("gpu lost"));
    }

    #[tokio::test]
    async fn embedding_failure_during_ingest_is_returned() {
        let service = service_with(Arc::new(OfflineEmbedder), Arc::new(ExtractiveSummarizer)).await;
        let error = service
            .ingest("some content", "a.txt")
            .await
            .expect_err("embedder offline");
        assert_eq!(error.kind(), ErrorKind::EmbeddingFailure);
        assert!(error.to_string().contains("connection refused"));
        assert_eq!(service.metrics_snapshot().documents_ingested, 0);
    }
}

//! Explicitly constructed application context.
//!
//! The process entry point builds one [`AppContext`] from [`Config`] and hands it to
//! [`crate::processing::RetrievalService::new`]. Nothing below this point reads globals.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, build_embedding_client},
    extraction::{DocumentExtractor, TextExtractor},
    processing::PipelineError,
    store::{CollectionHandle, Database, StoreError},
    summarization::{SummarizationClient, build_summarization_client},
};
use std::sync::Arc;

/// Long-lived handles shared by every request.
pub struct AppContext {
    /// Configuration the context was built from.
    pub config: Config,
    /// Ready handle to the configured collection.
    pub collection: CollectionHandle,
    /// Embedding model adapter.
    pub embedder: Arc<dyn EmbeddingClient>,
    /// Summarization model adapter.
    pub summarizer: Arc<dyn SummarizationClient>,
    /// Upload text extractor.
    pub extractor: Arc<dyn TextExtractor>,
}

impl AppContext {
    /// Open the database, ensure the collection, and build model adapters.
    pub async fn initialize(config: Config) -> Result<Self, PipelineError> {
        tracing::info!(path = %config.db_path.display(), "Opening vector database");
        let database = Database::open(&config.db_path)?;
        Self::with_database(config, database).await
    }

    /// Like [`AppContext::initialize`] but over an already opened database.
    ///
    /// Fails when the collection already holds vectors of a different dimension than the
    /// configured embedder produces.
    pub async fn with_database(config: Config, database: Database) -> Result<Self, PipelineError> {
        let collection = database.ensure_collection(&config.collection_name).await?;
        tracing::info!(
            provider = ?config.embedding_provider,
            model = %config.embedding_model,
            dimension = config.embedding_dimension,
            "Initializing embedding client"
        );
        let embedder = build_embedding_client(&config)?;
        if let Some(stored) = collection.dimension().await? {
            if stored != embedder.dimension() {
                return Err(StoreError::DimensionMismatch {
                    collection: config.collection_name.clone(),
                    expected: stored,
                    actual: embedder.dimension(),
                }
                .into());
            }
        }
        let summarizer = build_summarization_client(&config)?;
        tracing::info!(collection = %config.collection_name, "Application context ready");

        Ok(Self {
            config,
            collection,
            embedder,
            summarizer,
            extractor: Arc::new(DocumentExtractor::default()),
        })
    }
}

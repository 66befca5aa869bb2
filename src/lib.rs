#![deny(missing_docs)]

//! Core library for the docqa document question-answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Explicit wiring of the long-lived components.
pub mod context;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Raw text extraction from uploaded files.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Chunking, retrieval, and theme summarization.
pub mod processing;
/// Persistent local vector store.
pub mod store;
/// Summarization client abstraction and adapters.
pub mod summarization;

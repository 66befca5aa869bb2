//! HTTP surface for the document QA pipeline.
//!
//! The router exposes:
//!
//! - `POST /upload` – Multipart upload (field `file`); the text is extracted, chunked, embedded
//!   and stored under the file's name. Returns `{ "status": "uploaded", "chunks": n }`.
//! - `POST /ingest` – JSON `{ "text": "...", "source": "optional-label" }`, same pipeline without
//!   extraction.
//! - `GET /query?q=...&k=5` – Ranked chunks for a question.
//! - `GET /theme?q=...&k=5` – Theme summary over the chunks retrieved for a question.
//! - `GET /metrics` – Pipeline counters.
//! - `GET /health` – Collection name and record count.
//! - `GET /commands` – Machine-readable command catalog.
//!
//! Failures are rendered as `{ "status": "error", "kind": "...", "message": "..." }`.

use crate::processing::{ErrorKind, PipelineError, QueryHit, RetrievalApi};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

const UPLOAD_FIELD: &str = "file";
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Build the HTTP router exposing the retrieval API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RetrievalApi + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(upload_document::<S>))
        .route("/ingest", post(ingest_text::<S>))
        .route("/query", get(query_documents::<S>))
        .route("/theme", get(summarize_themes::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/health", get(health::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(service)
}

/// Success response for `POST /upload` and `POST /ingest`.
#[derive(Serialize)]
struct IngestResponse {
    status: &'static str,
    chunks: usize,
}

/// Accept a multipart file, extract its text, and store the chunks.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestResponse>, AppError>
where
    S: RetrievalApi,
{
    let mut multipart = multipart?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| invalid(format!("Malformed multipart body: {error}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|error| invalid(format!("Failed to read upload: {error}")))?;

        let outcome = service.upload(bytes.to_vec(), filename.clone()).await?;
        tracing::info!(filename, chunks = outcome.chunks, "Upload request completed");
        return Ok(Json(IngestResponse {
            status: "uploaded",
            chunks: outcome.chunks,
        }));
    }

    Err(invalid(format!("Missing multipart field '{UPLOAD_FIELD}'")))
}

/// Request body for `POST /ingest`.
#[derive(Deserialize)]
struct IngestRequest {
    /// Raw document text.
    text: String,
    /// Optional provenance label (defaults to `"upload"`).
    #[serde(default)]
    source: Option<String>,
}

async fn ingest_text<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError>
where
    S: RetrievalApi,
{
    let Json(request) = request?;
    let outcome = service.ingest(request.text, request.source).await?;
    Ok(Json(IngestResponse {
        status: "uploaded",
        chunks: outcome.chunks,
    }))
}

/// Query string shared by `/query` and `/theme`.
#[derive(Deserialize)]
struct QueryParams {
    q: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse {
    question: String,
    answers: Vec<QueryHit>,
}

async fn query_documents<S>(
    State(service): State<Arc<S>>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: RetrievalApi,
{
    let Query(params) = params?;
    let answers = service.ask(params.q.clone(), params.k).await?;
    Ok(Json(QueryResponse {
        question: params.q,
        answers,
    }))
}

#[derive(Serialize)]
struct ThemeResponse {
    question: String,
    themes: String,
}

async fn summarize_themes<S>(
    State(service): State<Arc<S>>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<ThemeResponse>, AppError>
where
    S: RetrievalApi,
{
    let Query(params) = params?;
    let summary = service.summarize_themes(params.q, params.k).await?;
    Ok(Json(ThemeResponse {
        question: summary.question,
        themes: summary.themes,
    }))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: RetrievalApi,
{
    Json(service.metrics_snapshot())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    collection: String,
    records: u64,
}

async fn health<S>(State(service): State<Arc<S>>) -> Result<Json<HealthResponse>, AppError>
where
    S: RetrievalApi,
{
    let snapshot = service.health().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        collection: snapshot.collection,
        records: snapshot.records,
    }))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                description: "Upload a text or PDF file as multipart field 'file'; its text is chunked by paragraph, embedded, and stored.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ingest",
                method: "POST",
                path: "/ingest",
                description: "Chunk, embed, and store raw text under an optional source label.",
                request_example: Some(json!({
                    "text": "First paragraph.\n\nSecond paragraph.",
                    "source": "notes.txt"
                })),
            },
            CommandDescriptor {
                name: "query",
                method: "GET",
                path: "/query?q=<question>&k=5",
                description: "Return the stored chunks most similar to the question, best first.",
                request_example: None,
            },
            CommandDescriptor {
                name: "theme",
                method: "GET",
                path: "/theme?q=<question>&k=5",
                description: "Summarize the themes of the chunks retrieved for the question.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion, query, and failure counters.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Report the active collection and its record count.",
                request_example: None,
            },
        ],
    })
}

fn invalid(message: String) -> AppError {
    AppError(PipelineError::InvalidRequest(message))
}

struct AppError(PipelineError);

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::ExtractionFailure => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::EmbeddingFailure
        | ErrorKind::StorageFailure
        | ErrorKind::SummarizationFailure
        | ErrorKind::ChunkingFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let body = json!({
            "status": "error",
            "kind": kind,
            "message": self.0.to_string(),
        });
        (status_for(kind), Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self(inner)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        invalid(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        invalid(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        invalid(rejection.body_text())
    }
}

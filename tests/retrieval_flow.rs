use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docqa::{
    api,
    config::{Config, EmbeddingProvider},
    context::AppContext,
    processing::{ErrorKind, RetrievalService, themes::NO_CONTENT_MESSAGE},
    store::Database,
};
use httpmock::{Method::POST, MockServer};
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;

fn test_config(dir: &TempDir) -> Config {
    Config {
        db_path: dir.path().join("docqa.sqlite"),
        embedding_dimension: 64,
        ..Config::default()
    }
}

async fn open_service(config: &Config) -> RetrievalService {
    let context = AppContext::initialize(config.clone())
        .await
        .expect("context");
    RetrievalService::new(context).expect("service")
}

#[tokio::test]
async fn ingested_paragraph_is_its_own_best_match() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&test_config(&dir)).await;

    let outcome = service
        .ingest(
            "Rust guarantees memory safety.\n\nSQLite stores the vectors.\n\nTokio drives the server.",
            "handbook.txt",
        )
        .await
        .expect("ingest");
    assert_eq!(outcome.chunks, 3);

    let hits = service
        .ask("SQLite stores the vectors.", Some(1))
        .await
        .expect("ask");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "SQLite stores the vectors.");
    assert_eq!(hits[0].meta.source, "handbook.txt");
}

#[tokio::test]
async fn store_survives_restart_and_keeps_assigning_fresh_ids() {
    let dir = TempDir::new().expect("tempdir");
    let config = test_config(&dir);

    {
        let service = open_service(&config).await;
        service
            .ingest("first\n\nsecond", "a.txt")
            .await
            .expect("first ingest");
    }

    let service = open_service(&config).await;
    assert_eq!(service.health().await.expect("health").records, 2);
    service.ingest("third", "b.txt").await.expect("second ingest");

    let ids: Vec<String> = service
        .store()
        .records()
        .await
        .expect("records")
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(ids, vec!["chunk_0", "chunk_1", "chunk_2"]);

    let hits = service.ask("first", Some(1)).await.expect("ask");
    assert_eq!(hits[0].content, "first");
}

#[tokio::test]
async fn reopening_with_a_different_embedding_dimension_is_refused() {
    let dir = TempDir::new().expect("tempdir");
    let config = test_config(&dir);
    open_service(&config)
        .await
        .ingest("stored at 64 dimensions", "a.txt")
        .await
        .expect("ingest");

    let narrower = Config {
        embedding_dimension: 32,
        ..config.clone()
    };
    let error = match AppContext::initialize(narrower).await {
        Ok(_) => panic!("context opened over a 64-dimension collection"),
        Err(error) => error,
    };
    assert_eq!(error.kind(), ErrorKind::StorageFailure);
    assert!(error.to_string().contains("64"), "unexpected error: {error}");

    let service = open_service(&config).await;
    assert_eq!(service.health().await.expect("health").records, 1);
}

#[tokio::test]
async fn concurrent_ingests_never_share_an_id() {
    let dir = TempDir::new().expect("tempdir");
    let service = Arc::new(open_service(&test_config(&dir)).await);

    let tasks: Vec<_> = (0..8)
        .map(|task| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let text = (0..5)
                    .map(|i| format!("task {task} paragraph {i}"))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                service.ingest(&text, "parallel.txt").await
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("join").expect("ingest");
    }

    let mut ids: Vec<String> = service
        .store()
        .records()
        .await
        .expect("records")
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(ids.len(), 40);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 40);
}

#[tokio::test]
async fn themes_over_empty_store_report_no_content() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&test_config(&dir)).await;

    let summary = service
        .summarize_themes("anything at all", None)
        .await
        .expect("themes");
    assert_eq!(summary.themes, NO_CONTENT_MESSAGE);
}

#[tokio::test]
async fn extractive_themes_come_from_retrieved_text() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&test_config(&dir)).await;
    service
        .ingest("The cache evicts old entries. It runs hourly.", "ops.txt")
        .await
        .expect("ingest");

    let summary = service
        .summarize_themes("The cache evicts old entries. It runs hourly.", Some(1))
        .await
        .expect("themes");
    assert!(summary.themes.contains("The cache evicts old entries."));
}

#[tokio::test]
async fn ollama_embeddings_flow_through_the_store() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/embed")
                .json_body_partial(r#"{"model":"all-minilm"}"#);
            then.status(200)
                .json_body(json!({ "embeddings": [[0.6, 0.8, 0.0, 0.0]] }));
        })
        .await;

    let dir = TempDir::new().expect("tempdir");
    let config = Config {
        embedding_provider: EmbeddingProvider::Ollama,
        embedding_dimension: 4,
        ollama_url: server.base_url(),
        ..test_config(&dir)
    };
    let service = open_service(&config).await;

    service
        .ingest("single paragraph", "remote.txt")
        .await
        .expect("ingest");
    let hits = service.ask("anything", None).await.expect("ask");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].meta.source, "remote.txt");
    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn unreachable_embedder_fails_ingest_without_writing() {
    let dir = TempDir::new().expect("tempdir");
    let config = Config {
        embedding_provider: EmbeddingProvider::Ollama,
        ollama_url: "http://127.0.0.1:9".into(),
        ..test_config(&dir)
    };
    let service = open_service(&config).await;

    let error = service
        .ingest("never stored", "lost.txt")
        .await
        .expect_err("embedder offline");
    assert_eq!(error.kind(), ErrorKind::EmbeddingFailure);
    assert_eq!(service.health().await.expect("health").records, 0);
}

#[tokio::test]
async fn http_upload_then_query_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let database = Database::open(dir.path().join("http.sqlite")).expect("database");
    let context = AppContext::with_database(test_config(&dir), database)
        .await
        .expect("context");
    let app = api::create_router(Arc::new(RetrievalService::new(context).expect("service")));

    let boundary = "flow-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"guide.txt\"\r\nContent-Type: text/plain\r\n\r\nInstall the binary.\n\nRun the server.\r\n--{boundary}--\r\n"
    );
    let upload = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("upload response");
    assert_eq!(upload.status(), StatusCode::OK);

    let query = app
        .oneshot(
            Request::builder()
                .uri("/query?q=Run%20the%20server.&k=1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("query response");
    assert_eq!(query.status(), StatusCode::OK);
    let bytes = to_bytes(query.into_body(), usize::MAX)
        .await
        .expect("body");
    let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(json["answers"][0]["content"], "Run the server.");
    assert_eq!(json["answers"][0]["meta"]["source"], "guide.txt");
}

//! Provider HTTP client tests against a local mock server: request shapes,
//! response parsing, order preservation, and the no-retry-on-client-error
//! contract.

use httpmock::prelude::*;
use serde_json::json;

use ragline::embedding::{CohereEmbedder, EmbeddingGateway, EmbeddingMode, GeminiEmbedder};
use ragline::generation::{GeminiGenerator, GenerativeGateway};
use ragline::types::RagError;

#[tokio::test]
async fn gemini_embedder_parses_batched_vectors_in_order() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/text-embedding-004:batchEmbedContents")
                .header("x-goog-api-key", "test-key")
                .body_contains("RETRIEVAL_DOCUMENT");
            then.status(200).json_body(json!({
                "embeddings": [
                    {"values": [1.0, 0.0, 0.0]},
                    {"values": [0.0, 1.0, 0.0]},
                ]
            }));
        })
        .await;

    let embedder = GeminiEmbedder::new("test-key", "text-embedding-004", 3)
        .unwrap()
        .with_base_url(server.base_url());
    let vectors = embedder
        .embed_batch(
            &["first text".to_string(), "second text".to_string()],
            EmbeddingMode::Document,
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
}

#[tokio::test]
async fn gemini_embedder_maps_query_mode_to_the_query_task_type() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/text-embedding-004:batchEmbedContents")
                .body_contains("RETRIEVAL_QUERY");
            then.status(200)
                .json_body(json!({"embeddings": [{"values": [0.5, 0.5, 0.0]}]}));
        })
        .await;

    let embedder = GeminiEmbedder::new("test-key", "text-embedding-004", 3)
        .unwrap()
        .with_base_url(server.base_url());
    let vector = embedder
        .embed_text("what is ros2", EmbeddingMode::Query)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(vector.len(), 3);
}

#[tokio::test]
async fn gemini_embedder_rejects_count_mismatches() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path_contains("batchEmbedContents");
            then.status(200)
                .json_body(json!({"embeddings": [{"values": [1.0, 0.0, 0.0]}]}));
        })
        .await;

    let embedder = GeminiEmbedder::new("test-key", "text-embedding-004", 3)
        .unwrap()
        .with_base_url(server.base_url());
    let err = embedder
        .embed_batch(
            &["one".to_string(), "two".to_string()],
            EmbeddingMode::Document,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path_contains("batchEmbedContents");
            then.status(400).body("invalid request");
        })
        .await;

    let embedder = GeminiEmbedder::new("test-key", "text-embedding-004", 3)
        .unwrap()
        .with_base_url(server.base_url());
    let err = embedder
        .embed_batch(&["text".to_string()], EmbeddingMode::Document)
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::Embedding(_)));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn cohere_embedder_sends_input_type_and_parses_floats() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v2/embed")
                .header("authorization", "Bearer cohere-key")
                .body_contains("search_document");
            then.status(200).json_body(json!({
                "id": "emb-1",
                "embeddings": {"float": [[0.1, 0.2], [0.3, 0.4]]}
            }));
        })
        .await;

    let embedder = CohereEmbedder::new("cohere-key", "embed-english-v3.0", 2)
        .unwrap()
        .with_base_url(server.base_url());
    let vectors = embedder
        .embed_batch(
            &["alpha".to_string(), "beta".to_string()],
            EmbeddingMode::Document,
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
}

#[tokio::test]
async fn gemini_generator_streams_sse_fragments() {
    let server = MockServer::start_async().await;
    let body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello \"}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"grounded \"}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"world\"}]}}]}\n\n",
    );
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.5-flash:streamGenerateContent")
                .query_param("alt", "sse")
                .header("x-goog-api-key", "test-key");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        })
        .await;

    let generator = GeminiGenerator::new("test-key", "gemini-2.5-flash")
        .unwrap()
        .with_base_url(server.base_url());
    let answer = generator
        .generate("Question: What is ROS2?", "answer from context")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(answer, "Hello grounded world");
}

#[tokio::test]
async fn gemini_generator_surfaces_http_errors_before_streaming() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path_contains("streamGenerateContent");
            then.status(500).body("backend exploded");
        })
        .await;

    let generator = GeminiGenerator::new("test-key", "gemini-2.5-flash")
        .unwrap()
        .with_base_url(server.base_url());
    let err = generator
        .stream_generate("prompt", "system")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RagError::Generation(_)));
}

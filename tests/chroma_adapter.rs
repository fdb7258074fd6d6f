//! HTTP-level tests of the Chroma adapter against a mock server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use folio_rag::bootstrap::connect_index;
use folio_rag::chroma::ChromaIndex;
use folio_rag::config::Config;
use folio_rag_core::store::VectorIndex;

const COLLECTION_ID: &str = "6f1d2a0e-0000-4000-8000-000000000001";

async fn mount_collection(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/collections/portfolio"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": COLLECTION_ID,
            "name": "portfolio",
            "metadata": null
        })))
        .mount(server)
        .await;
}

fn config_for(server_uri: &str) -> Config {
    let mut config = Config::default();
    config.vector.provider = "chroma".to_string();
    config.vector.url = server_uri.to_string();
    config.vector.collection = "portfolio".to_string();
    config
}

#[tokio::test]
async fn test_query_sends_filter_and_maps_results() {
    let server = MockServer::start().await;
    mount_collection(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/api/v1/collections/{COLLECTION_ID}/query")))
        .and(body_partial_json(json!({
            "n_results": 6,
            "where": {"category": {"$in": ["experience"]}},
            "include": ["documents", "metadatas", "distances"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ids": [["b", "a"]],
            "documents": [["Second doc", "First doc"]],
            "metadatas": [[
                {"category": "experience", "source": "exp/b.md"},
                {"category": "experience", "source": "exp/a.md"}
            ]],
            "distances": [[0.4, 0.1]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let index = ChromaIndex::connect(&server.uri(), "portfolio", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(index.collection_name(), "portfolio");

    let matches = index
        .query(&[0.1, 0.2, 0.3], 6, Some(&["experience"]))
        .await
        .unwrap();

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].chunk.content, "First doc");
    assert_eq!(matches[0].chunk.source(), Some("exp/a.md"));
    assert!((matches[0].distance - 0.1).abs() < 1e-9);
    assert_eq!(matches[1].chunk.content, "Second doc");
}

#[tokio::test]
async fn test_count() {
    let server = MockServer::start().await;
    mount_collection(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/collections/{COLLECTION_ID}/count")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(42)))
        .mount(&server)
        .await;

    let index = ChromaIndex::connect(&server.uri(), "portfolio", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(index.count().await.unwrap(), 42);
}

#[tokio::test]
async fn test_query_error_status_is_reported() {
    let server = MockServer::start().await;
    mount_collection(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/api/v1/collections/{COLLECTION_ID}/query")))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let index = ChromaIndex::connect(&server.uri(), "portfolio", Duration::from_secs(5))
        .await
        .unwrap();
    let err = index.query(&[1.0], 3, None).await.unwrap_err().to_string();
    assert!(err.contains("500"));
}

#[tokio::test]
async fn test_missing_collection_fails_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/collections/portfolio"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let result = ChromaIndex::connect(&server.uri(), "portfolio", Duration::from_secs(5)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_unreachable_index_degrades_instead_of_failing() {
    let index = connect_index(&config_for("http://127.0.0.1:1")).await;
    assert!(index.is_none());
}

#[tokio::test]
async fn test_disabled_index_is_not_contacted() {
    let server = MockServer::start().await;
    let mut config = config_for(&server.uri());
    config.vector.provider = "disabled".to_string();

    assert!(connect_index(&config).await.is_none());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_index_resolves_configured_collection() {
    let server = MockServer::start().await;
    mount_collection(&server).await;

    let index = connect_index(&config_for(&server.uri())).await;
    assert!(index.is_some());
}

//! DataServicesIndex against a mocked REST service

use fleet_vector::{
    DataServicesIndex, Document, IndexConfig, IndexError, SearchMode, SearchQuery, SemanticIndex,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn index_for(server: &MockServer) -> DataServicesIndex {
    DataServicesIndex::new(IndexConfig::new(server.uri())).unwrap()
}

#[tokio::test]
async fn test_create_collection_posts_seed_documents() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vector/create_collection"))
        .and(body_json(json!({
            "collection_name": "agent_cards",
            "documents": [{"page_content": "placeholder", "metadata": {"agent_url": ""}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .expect(1)
        .mount(&server)
        .await;

    let seed = Document::new("placeholder").with_metadata("agent_url", json!(""));
    index_for(&server)
        .await
        .create_collection("agent_cards", vec![seed])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_add_and_delete_by_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vector/agent_cards/add_documents"))
        .and(body_json(json!({
            "documents": [{"page_content": "A\nfoo\nhttp://a:1", "metadata": {"agent_url": "http://a:1"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/vector/agent_cards/delete_by_metadata_field"))
        .and(body_json(json!({"key": "agent_url", "value": "http://a:1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .expect(1)
        .mount(&server)
        .await;

    let index = index_for(&server).await;
    let doc = Document::new("A\nfoo\nhttp://a:1").with_metadata("agent_url", json!("http://a:1"));
    index.add_documents("agent_cards", vec![doc]).await.unwrap();
    index
        .delete_by_metadata_field("agent_cards", "agent_url", "http://a:1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_search_decodes_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vector/orchestrator_agent_cards/search"))
        .and(body_json(json!({
            "query": "sort a list",
            "search_type": "vector",
            "limit": 10,
            "hybrid_threshold": 0.1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "collection": "orchestrator_agent_cards",
            "search_type": "vector",
            "result": [{
                "content": "coder",
                "metadata": {"agent_url": "http://coder:1", "agent": {"name": "coder"}},
                "score": 0.82,
                "search_type": "vector",
                "hybrid_score": 0.0
            }]
        })))
        .mount(&server)
        .await;

    let response = index_for(&server)
        .await
        .search("orchestrator_agent_cards", &SearchQuery::new("sort a list"))
        .await
        .unwrap();

    assert_eq!(response.result.len(), 1);
    assert_eq!(response.result[0].metadata_str("agent_url"), Some("http://coder:1"));
    assert_eq!(response.result[0].score, 0.82);
}

#[tokio::test]
async fn test_hybrid_search_sends_weights() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vector/agent_cards/search"))
        .and(body_json(json!({
            "query": "q",
            "search_type": "hybrid",
            "limit": 3,
            "hybrid_threshold": 0.1,
            "fulltext_weight": 0.3,
            "vector_weight": 0.7
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success", "result": []})))
        .expect(1)
        .mount(&server)
        .await;

    let query = SearchQuery::new("q")
        .with_mode(SearchMode::Hybrid)
        .with_limit(3)
        .with_weights(0.7, 0.3);
    let response = index_for(&server).await.search("agent_cards", &query).await.unwrap();
    assert!(response.result.is_empty());
}

#[tokio::test]
async fn test_delete_all_and_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/vector/agent_cards/delete_all"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "db down"})))
        .mount(&server)
        .await;

    let err = index_for(&server).await.delete_all("agent_cards").await.unwrap_err();
    match err {
        IndexError::Status { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("db down"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_service_is_retryable() {
    let index = DataServicesIndex::new(IndexConfig::new("http://127.0.0.1:1")).unwrap();
    let err = index
        .search("agent_cards", &SearchQuery::new("x"))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

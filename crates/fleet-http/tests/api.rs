//! Registry API against the in-memory substrate and index

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use fleet_a2a::AgentCard;
use fleet_http::{ApiState, HttpServiceConfig, router};
use fleet_kv::MemoryStore;
use fleet_observability::FleetMetrics;
use fleet_registry::{AgentPublisher, Registry, RegistryConfig};
use fleet_vector::{Document, MemoryIndex, SemanticIndex};
use rstest::rstest;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> Router {
    let store = Arc::new(MemoryStore::new());
    let publisher = AgentPublisher::new(store.clone());
    publisher
        .register(&AgentCard::new("Alpha", "http://a:1").with_description("sorts numbers"))
        .await
        .unwrap();

    let registry = Registry::new(store, RegistryConfig::default())
        .bootstrap()
        .await
        .unwrap();

    let index = Arc::new(MemoryIndex::new());
    index
        .create_collection(
            "agent_cards",
            vec![
                Document::new("Alpha sorts numbers")
                    .with_metadata("agent_url", json!("http://a:1")),
                Document::new("Beta writes poems").with_metadata("agent_url", json!("http://b:1")),
            ],
        )
        .await
        .unwrap();

    let state = ApiState::new(registry, index, "agent_cards")
        .with_metrics(FleetMetrics::new().unwrap());
    router(state, &HttpServiceConfig::default())
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn search_request(body: Value) -> Request<Body> {
    Request::post("/search")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_root_reports_running() {
    let (status, body) = call(app().await, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Agent Cards API", "status": "running"}));
}

#[tokio::test]
async fn test_agents_lists_the_replica() {
    let (status, body) = call(
        app().await,
        Request::get("/agents").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let cards = body["agent_cards"].as_array().unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0]["name"], "Alpha");
    assert_eq!(cards[0]["url"], "http://a:1");
}

#[rstest]
#[case(json!({"query": "sort numbers"}))]
#[case(json!({"query": "sort numbers", "collection": "agent_cards", "search_type": "fulltext"}))]
#[case(json!({"query": "sort numbers", "search_type": "hybrid", "vector_weight": 0.7, "fulltext_weight": 0.3}))]
#[tokio::test]
async fn test_search_ranks_the_matching_agent_first(#[case] request: Value) {
    let (status, body) = call(app().await, search_request(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"][0]["metadata"]["agent_url"], "http://a:1");
}

#[tokio::test]
async fn test_search_failure_is_opaque() {
    let (status, body) = call(
        app().await,
        search_request(json!({"query": "x", "collection": "missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"detail": "Search failed"}));
}

#[tokio::test]
async fn test_health_reports_replica_size() {
    let (status, body) = call(
        app().await,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["live_agents"], 1);
    assert_eq!(body["redis"], "reachable");
}

#[tokio::test]
async fn test_metrics_are_prometheus_text() {
    let response = app()
        .await
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("fleet_live_agents 1"));
}

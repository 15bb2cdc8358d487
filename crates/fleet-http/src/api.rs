//! Registry API: live descriptors, semantic search, health and metrics

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use fleet_observability::FleetMetrics;
use fleet_registry::Registry;
use fleet_vector::{SearchQuery, SearchResponse, SemanticIndex};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{sync::Arc, time::Instant};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::config::HttpServiceConfig;
use crate::error::ApiError;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    registry: Arc<Registry>,
    index: Arc<dyn SemanticIndex>,
    collection: String,
    metrics: Option<FleetMetrics>,
    started: Instant,
}

impl ApiState {
    /// `collection` is searched when a request names none
    pub fn new(
        registry: Arc<Registry>,
        index: Arc<dyn SemanticIndex>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            index,
            collection: collection.into(),
            metrics: None,
            started: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, metrics: FleetMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Body of `POST /search`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(flatten)]
    pub query: SearchQuery,
}

/// Build the registry API router
pub fn router(state: ApiState, http: &HttpServiceConfig) -> Router {
    let router = Router::new()
        .route("/", get(root))
        .route("/agents", get(list_agents))
        .route("/search", post(search))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if http.enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Agent Cards API", "status": "running" }))
}

async fn list_agents(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let cards = state.registry.list_live();
    let agent_cards = serde_json::to_value(cards.as_slice())
        .map_err(|e| ApiError::Registry(e.into()))?;
    Ok(Json(json!({ "agent_cards": agent_cards })))
}

async fn search(
    State(state): State<ApiState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let collection = request
        .collection
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| state.collection.clone());
    debug!(
        collection = %collection,
        search_type = request.query.mode.as_str(),
        limit = request.query.limit,
        "Searching agent cards"
    );
    let response = state.index.search(&collection, &request.query).await?;
    Ok(Json(response))
}

async fn health(State(state): State<ApiState>) -> (StatusCode, Json<Value>) {
    let (status, code, redis) = match state.registry.ping().await {
        Ok(()) => ("healthy", StatusCode::OK, "reachable"),
        Err(e) => {
            warn!(error = %e, "Registry substrate unreachable");
            ("degraded", StatusCode::SERVICE_UNAVAILABLE, "unreachable")
        }
    };
    (
        code,
        Json(json!({
            "status": status,
            "service": "fleet-registry",
            "timestamp": chrono::Utc::now(),
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": state.started.elapsed().as_secs(),
            "live_agents": state.registry.len(),
            "redis": redis,
        })),
    )
}

async fn metrics(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let Some(metrics) = state.metrics else {
        return Ok((StatusCode::NOT_FOUND, "metrics disabled").into_response());
    };
    metrics.set_live_agents(state.registry.len());
    let body = metrics
        .encode()
        .map_err(|e| ApiError::Metrics(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

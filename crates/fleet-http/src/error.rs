//! Errors surfaced by the registry API
//!
//! Callers only ever see an opaque `{"detail": ...}` body; the cause is logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use fleet_registry::RegistryError;
use fleet_vector::IndexError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("registry lookup failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("search failed: {0}")]
    Search(#[from] IndexError),

    #[error("metrics encoding failed: {0}")]
    Metrics(String),
}

impl ApiError {
    pub fn detail(&self) -> &'static str {
        match self {
            ApiError::Search(_) => "Search failed",
            ApiError::Registry(_) | ApiError::Metrics(_) => "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.detail() })),
        )
            .into_response()
    }
}

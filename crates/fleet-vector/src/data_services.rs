//! REST client for the data-services vector endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create | `POST /vector/create_collection` `{collection_name, documents}` |
//! | add | `POST /vector/{c}/add_documents` `{documents}` |
//! | search | `POST /vector/{c}/search` [`SearchQuery`] |
//! | delete by field | `DELETE /vector/{c}/delete_by_metadata_field` `{key, value}` |
//! | delete all | `DELETE /vector/{c}/delete_all` |

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::document::{Document, SearchQuery, SearchResponse};
use crate::error::{IndexError, IndexResult};
use crate::index::SemanticIndex;

/// Default in-cluster address of the data services
pub const DEFAULT_BASE_URL: &str = "http://data-services.dac.svc.cluster.local:8000";

/// Connection settings for [`DataServicesIndex`]
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl IndexConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`SemanticIndex`] backed by the data-services REST API
#[derive(Debug, Clone)]
pub struct DataServicesIndex {
    base: Url,
    http: Client,
}

impl DataServicesIndex {
    pub fn new(config: IndexConfig) -> IndexResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| IndexError::InvalidConfig(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(IndexError::InvalidConfig(format!(
                "{} cannot be a base url",
                config.base_url
            )));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IndexError::InvalidConfig(e.to_string()))?;
        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `{base}/vector/{segments...}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> IndexResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| IndexError::InvalidConfig("base url cannot have a path".into()))?
            .pop_if_empty()
            .push("vector")
            .extend(segments);
        Ok(url)
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> IndexResult<Value> {
        debug!(method = %method, url = %url, "Index request");

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| IndexError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SemanticIndex for DataServicesIndex {
    async fn create_collection(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> IndexResult<()> {
        let url = self.endpoint(&["create_collection"])?;
        let body = json!({"collection_name": collection, "documents": documents});
        self.call(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    async fn add_documents(&self, collection: &str, documents: Vec<Document>) -> IndexResult<()> {
        let url = self.endpoint(&[collection, "add_documents"])?;
        let body = json!({"documents": documents});
        self.call(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    async fn delete_by_metadata_field(
        &self,
        collection: &str,
        key: &str,
        value: &str,
    ) -> IndexResult<()> {
        let url = self.endpoint(&[collection, "delete_by_metadata_field"])?;
        let body = json!({"key": key, "value": value});
        self.call(Method::DELETE, url, Some(&body)).await?;
        Ok(())
    }

    async fn delete_all(&self, collection: &str) -> IndexResult<()> {
        let url = self.endpoint(&[collection, "delete_all"])?;
        self.call::<Value>(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> IndexResult<SearchResponse> {
        let url = self.endpoint(&[collection, "search"])?;
        let value = self
            .call(Method::POST, url, Some(&query.wire_body()))
            .await?;
        serde_json::from_value(value).map_err(|e| IndexError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_building() {
        let index = DataServicesIndex::new(IndexConfig::new("http://ds:8000")).unwrap();
        assert_eq!(
            index.endpoint(&["agent_cards", "search"]).unwrap().as_str(),
            "http://ds:8000/vector/agent_cards/search"
        );

        let index = DataServicesIndex::new(IndexConfig::new("http://ds:8000/api/")).unwrap();
        assert_eq!(
            index.endpoint(&["create_collection"]).unwrap().as_str(),
            "http://ds:8000/api/vector/create_collection"
        );
    }

    #[test]
    fn test_collection_name_is_escaped() {
        let index = DataServicesIndex::new(IndexConfig::default()).unwrap();
        let url = index.endpoint(&["a/b", "delete_all"]).unwrap();
        assert!(url.path().ends_with("/vector/a%2Fb/delete_all"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(DataServicesIndex::new(IndexConfig::new("not a url")).is_err());
        assert!(DataServicesIndex::new(IndexConfig::new("mailto:ops@example.com")).is_err());
    }
}

//! Candidate agents for a query, read back from the semantic index

use fleet_a2a::AgentCard;
use fleet_vector::{IndexResult, SearchHit, SearchQuery, SemanticIndex};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RoutingConfig;

/// Metadata key holding the mirrored descriptor
const AGENT_FIELD: &str = "agent";

#[derive(Clone)]
pub struct CandidateRetriever {
    index: Arc<dyn SemanticIndex>,
    collection: String,
    query: SearchQuery,
}

impl CandidateRetriever {
    pub fn new(index: Arc<dyn SemanticIndex>, config: &RoutingConfig) -> Self {
        Self {
            index,
            collection: config.collection.clone(),
            query: SearchQuery::new("")
                .with_mode(config.search_mode)
                .with_limit(config.top_k),
        }
    }

    /// Up to `top_k` distinct agents relevant to `query`, best first
    ///
    /// Hits without a decodable descriptor are skipped, and a url is kept
    /// only the first time it appears.
    pub async fn retrieve(&self, query: &str) -> IndexResult<Vec<AgentCard>> {
        let mut request = self.query.clone();
        request.query = query.to_string();
        let response = self.index.search(&self.collection, &request).await?;
        if response.status != "success" {
            warn!(
                collection = %self.collection,
                status = %response.status,
                "Candidate search did not succeed"
            );
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let candidates: Vec<AgentCard> = response
            .result
            .iter()
            .filter_map(descriptor_of)
            .filter(|card| seen.insert(card.url.clone()))
            .collect();
        debug!(
            collection = %self.collection,
            hits = response.result.len(),
            candidates = candidates.len(),
            "Candidates retrieved"
        );
        Ok(candidates)
    }
}

/// Descriptor stored under `metadata.agent`, as an object or as JSON text
pub fn descriptor_of(hit: &SearchHit) -> Option<AgentCard> {
    let decoded = match hit.metadata.get(AGENT_FIELD)? {
        Value::String(text) => AgentCard::from_json(text).map_err(|e| e.to_string()),
        value @ Value::Object(_) => {
            serde_json::from_value::<AgentCard>(value.clone()).map_err(|e| e.to_string())
        }
        _ => Err("not an object".to_string()),
    };
    match decoded {
        Ok(card) if !card.name.is_empty() && !card.url.is_empty() => Some(card),
        Ok(card) => {
            warn!(agent = %card.name, agent_url = %card.url, "Skipping incomplete candidate");
            None
        }
        Err(reason) => {
            warn!(error = %reason, "Skipping undecodable candidate");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_vector::{Document, MemoryIndex};
    use serde_json::json;

    fn doc(name: &str, description: &str, url: &str) -> Document {
        Document::new(format!("{name}\n{description}\n{url}"))
            .with_metadata("agent", json!({"name": name, "description": description, "url": url}))
            .with_metadata("agent_url", json!(url))
    }

    async fn retriever(documents: Vec<Document>) -> CandidateRetriever {
        let index = Arc::new(MemoryIndex::new());
        index
            .create_collection("orchestrator_agent_cards", documents)
            .await
            .unwrap();
        CandidateRetriever::new(index, &RoutingConfig::default())
    }

    #[tokio::test]
    async fn test_malformed_and_placeholder_hits_are_skipped() {
        let retriever = retriever(vec![
            doc("coder", "writes python code", "http://coder:1"),
            Document::new("python placeholder").with_metadata("agent_url", json!("")),
            Document::new("python broken").with_metadata("agent", json!({"name": 3})),
            Document::new("python text")
                .with_metadata("agent", json!(r#"{"name":"text","url":"http://text:1"}"#)),
        ])
        .await;

        let mut names: Vec<String> = retriever
            .retrieve("python")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["coder", "text"]);
    }

    #[tokio::test]
    async fn test_duplicate_urls_are_collapsed() {
        let retriever = retriever(vec![
            doc("coder", "writes python code", "http://coder:1"),
            doc("coder", "writes python code", "http://coder:1"),
        ])
        .await;
        assert_eq!(retriever.retrieve("python code").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_collection_is_an_error() {
        let retriever = CandidateRetriever::new(Arc::new(MemoryIndex::new()), &RoutingConfig::default());
        assert!(retriever.retrieve("anything").await.is_err());
    }
}

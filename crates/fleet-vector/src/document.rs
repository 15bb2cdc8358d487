//! Documents, queries and hits

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document stored in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// String value of a metadata field
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// How a query is matched against documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Embedding similarity
    #[default]
    Vector,
    /// Lexical match
    Fulltext,
    /// Weighted union of both
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Vector => "vector",
            SearchMode::Fulltext => "fulltext",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vector" => Ok(SearchMode::Vector),
            "fulltext" | "lexical" => Ok(SearchMode::Fulltext),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(format!("unknown search mode: {other}")),
        }
    }
}

/// A search request against one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(rename = "search_type", default)]
    pub mode: SearchMode,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Minimum score kept
    #[serde(default = "default_threshold")]
    pub hybrid_threshold: f64,
    /// Only sent in hybrid mode
    #[serde(default = "default_weight", skip_serializing_if = "Option::is_none")]
    pub fulltext_weight: Option<f64>,
    /// Only sent in hybrid mode
    #[serde(default = "default_weight", skip_serializing_if = "Option::is_none")]
    pub vector_weight: Option<f64>,
}

fn default_limit() -> usize {
    10
}

fn default_threshold() -> f64 {
    0.1
}

fn default_weight() -> Option<f64> {
    Some(0.5)
}

impl SearchQuery {
    /// A vector-mode query with default limit and threshold
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: SearchMode::Vector,
            limit: default_limit(),
            hybrid_threshold: default_threshold(),
            fulltext_weight: default_weight(),
            vector_weight: default_weight(),
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.hybrid_threshold = threshold;
        self
    }

    pub fn with_weights(mut self, vector_weight: f64, fulltext_weight: f64) -> Self {
        self.vector_weight = Some(vector_weight);
        self.fulltext_weight = Some(fulltext_weight);
        self
    }

    /// Body sent to the index service; weights are dropped outside hybrid mode
    pub fn wire_body(&self) -> SearchQuery {
        let mut body = self.clone();
        if self.mode != SearchMode::Hybrid {
            body.vector_weight = None;
            body.fulltext_weight = None;
        }
        body
    }
}

/// One matching document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub search_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f64>,
}

impl SearchHit {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Search answer in the index service's envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub search_type: String,
    #[serde(default)]
    pub result: Vec<SearchHit>,
}

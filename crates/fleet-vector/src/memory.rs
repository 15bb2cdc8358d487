//! In-process [`SemanticIndex`]
//!
//! Scores with a bag-of-words model: vector mode is the cosine of term
//! count vectors, full-text mode is the share of query terms present in the
//! document. Hybrid mode lists the weighted hits of both, like the REST
//! service does.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::document::{Document, SearchHit, SearchMode, SearchQuery, SearchResponse};
use crate::error::{IndexError, IndexResult};
use crate::index::SemanticIndex;

#[derive(Debug, Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents of `collection`, in insertion order
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_collection(&self, collection: &str) -> bool {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(collection)
    }

    fn with_collection<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Vec<Document>) -> T,
    ) -> IndexResult<T> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        Ok(f(docs))
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn term_counts(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for term in terms(text) {
        *counts.entry(term).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 { 0.0 } else { dot / denom }
}

fn lexical(query: &HashMap<String, f64>, doc: &HashMap<String, f64>) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let present = query.keys().filter(|t| doc.contains_key(*t)).count();
    present as f64 / query.len() as f64
}

/// Top `limit` documents by `score`, at or above `threshold`
fn rank(
    docs: &[Document],
    query: &str,
    limit: usize,
    threshold: f64,
    mode: SearchMode,
    score: fn(&HashMap<String, f64>, &HashMap<String, f64>) -> f64,
) -> Vec<SearchHit> {
    let query = term_counts(query);
    let mut hits: Vec<SearchHit> = docs
        .iter()
        .map(|doc| (doc, score(&query, &term_counts(&doc.page_content))))
        .filter(|(_, s)| *s > 0.0 && *s >= threshold)
        .map(|(doc, s)| SearchHit {
            content: doc.page_content.clone(),
            metadata: doc.metadata.clone(),
            score: s,
            search_type: mode.as_str().to_string(),
            hybrid_score: Some(0.0),
        })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}

#[async_trait]
impl SemanticIndex for MemoryIndex {
    async fn create_collection(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> IndexResult<()> {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_insert(documents);
        Ok(())
    }

    async fn add_documents(&self, collection: &str, documents: Vec<Document>) -> IndexResult<()> {
        self.with_collection(collection, |docs| docs.extend(documents))
    }

    async fn delete_by_metadata_field(
        &self,
        collection: &str,
        key: &str,
        value: &str,
    ) -> IndexResult<()> {
        self.with_collection(collection, |docs| {
            docs.retain(|doc| doc.metadata_str(key) != Some(value))
        })
    }

    async fn delete_all(&self, collection: &str) -> IndexResult<()> {
        self.with_collection(collection, Vec::clear)
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> IndexResult<SearchResponse> {
        let docs = self.with_collection(collection, |docs| docs.clone())?;
        let threshold = query.hybrid_threshold;

        let result = match query.mode {
            SearchMode::Vector => rank(
                &docs,
                &query.query,
                query.limit,
                threshold,
                SearchMode::Vector,
                cosine,
            ),
            SearchMode::Fulltext => rank(
                &docs,
                &query.query,
                query.limit,
                threshold,
                SearchMode::Fulltext,
                lexical,
            ),
            SearchMode::Hybrid => {
                let weighted = |hits: Vec<SearchHit>, weight: f64| {
                    hits.into_iter().filter_map(move |mut hit| {
                        let score = hit.score * weight;
                        hit.hybrid_score = Some(score);
                        (score >= threshold).then_some(hit)
                    })
                };
                let vector = rank(&docs, &query.query, query.limit, 0.0, SearchMode::Vector, cosine);
                let fulltext = rank(
                    &docs,
                    &query.query,
                    query.limit,
                    0.0,
                    SearchMode::Fulltext,
                    lexical,
                );
                let mut merged: Vec<SearchHit> = weighted(vector, query.vector_weight.unwrap_or(0.5))
                    .chain(weighted(fulltext, query.fulltext_weight.unwrap_or(0.5)))
                    .collect();
                merged.sort_by(|a, b| {
                    b.hybrid_score
                        .unwrap_or(0.0)
                        .total_cmp(&a.hybrid_score.unwrap_or(0.0))
                });
                merged
            }
        };

        Ok(SearchResponse {
            status: "success".to_string(),
            collection: collection.to_string(),
            search_type: query.mode.as_str().to_string(),
            result,
        })
    }
}

//! The `SemanticIndex` capability surface

use async_trait::async_trait;

use crate::document::{Document, SearchQuery, SearchResponse};
use crate::error::IndexResult;

/// A vector + lexical document store organised in named collections
///
/// Implementations are shared between tasks.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Create `collection` seeded with `documents`; a no-op when it exists
    async fn create_collection(&self, collection: &str, documents: Vec<Document>)
    -> IndexResult<()>;

    /// Append documents to `collection`
    async fn add_documents(&self, collection: &str, documents: Vec<Document>) -> IndexResult<()>;

    /// Delete every document whose metadata `key` equals `value`
    async fn delete_by_metadata_field(
        &self,
        collection: &str,
        key: &str,
        value: &str,
    ) -> IndexResult<()>;

    /// Delete every document of `collection`
    async fn delete_all(&self, collection: &str) -> IndexResult<()>;

    /// Rank documents of `collection` against `query`
    async fn search(&self, collection: &str, query: &SearchQuery) -> IndexResult<SearchResponse>;
}

#[async_trait]
impl<T: SemanticIndex + ?Sized> SemanticIndex for std::sync::Arc<T> {
    async fn create_collection(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> IndexResult<()> {
        (**self).create_collection(collection, documents).await
    }

    async fn add_documents(&self, collection: &str, documents: Vec<Document>) -> IndexResult<()> {
        (**self).add_documents(collection, documents).await
    }

    async fn delete_by_metadata_field(
        &self,
        collection: &str,
        key: &str,
        value: &str,
    ) -> IndexResult<()> {
        (**self).delete_by_metadata_field(collection, key, value).await
    }

    async fn delete_all(&self, collection: &str) -> IndexResult<()> {
        (**self).delete_all(collection).await
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> IndexResult<SearchResponse> {
        (**self).search(collection, query).await
    }
}

//! Semantic mirror of the live set
//!
//! Each live descriptor is kept as one document in a collection of the
//! semantic index, keyed by the `agent_url` metadata field. Changes arrive
//! through [`Registry::watch`] and are applied in order by a single worker so
//! the fan-out worker never waits on the index. The queue between the two is
//! bounded; when it overflows the worker drops what is queued and rebuilds
//! the collection from the replica.

use fleet_a2a::AgentCard;
use fleet_observability::{FleetMetrics, MirrorOp};
use fleet_vector::{Document, SemanticIndex};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{HandlerError, RegistryResult};
use crate::event::{ChangeEvent, ChangeKind, Dispatch};
use crate::registry::{Registry, WatchHandle};

/// Metadata key holding the serialized descriptor
pub const AGENT_FIELD: &str = "agent";

/// Metadata key the mirror deletes by
pub const AGENT_URL_FIELD: &str = "agent_url";

/// Changes held for the worker before the mirror falls back to a resync
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Collection holding one document per live agent
    pub collection: String,
    /// Pending changes the worker may fall behind by
    pub queue_capacity: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self::new("agent_cards")
    }
}

impl MirrorConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Keeps the collection non-empty; carries no descriptor
fn placeholder() -> Document {
    Document::new("placeholder").with_metadata(AGENT_URL_FIELD, Value::String(String::new()))
}

/// Applies registry changes to a semantic index collection
pub struct SemanticMirror {
    index: Arc<dyn SemanticIndex>,
    config: MirrorConfig,
    metrics: Option<FleetMetrics>,
}

impl SemanticMirror {
    pub fn new(index: Arc<dyn SemanticIndex>, config: MirrorConfig) -> Self {
        Self {
            index,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: FleetMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Document for `card`: name, description and url on separate lines
    pub fn document_for(card: &AgentCard) -> RegistryResult<Document> {
        Ok(
            Document::new(format!("{}\n{}\n{}", card.name, card.description, card.url))
                .with_metadata(AGENT_FIELD, serde_json::to_value(card)?)
                .with_metadata(AGENT_URL_FIELD, Value::String(card.url.clone())),
        )
    }

    /// Create the collection unless it exists
    ///
    /// The index service refuses an empty create, so the collection is
    /// seeded with a placeholder that carries no descriptor.
    pub async fn ensure_collection(&self) -> RegistryResult<()> {
        self.index
            .create_collection(&self.config.collection, vec![placeholder()])
            .await
            .inspect_err(|_| self.record_failure(MirrorOp::CreateCollection))?;
        info!(collection = %self.config.collection, "Mirror collection ready");
        Ok(())
    }

    /// Replace whatever document `card.url` has with a fresh one
    pub async fn upsert(&self, card: &AgentCard) -> RegistryResult<()> {
        let document = Self::document_for(card)?;
        let result = async {
            self.index
                .delete_by_metadata_field(&self.config.collection, AGENT_URL_FIELD, &card.url)
                .await?;
            self.index
                .add_documents(&self.config.collection, vec![document])
                .await
        }
        .await;
        result.inspect_err(|_| self.record_failure(MirrorOp::Upsert))?;
        debug!(agent_url = %card.url, collection = %self.config.collection, "Mirrored agent");
        Ok(())
    }

    pub async fn remove(&self, url: &str) -> RegistryResult<()> {
        self.index
            .delete_by_metadata_field(&self.config.collection, AGENT_URL_FIELD, url)
            .await
            .inspect_err(|_| self.record_failure(MirrorOp::Remove))?;
        debug!(agent_url = %url, collection = %self.config.collection, "Removed mirrored agent");
        Ok(())
    }

    pub async fn apply(&self, event: &ChangeEvent) -> RegistryResult<()> {
        match (&event.kind, &event.descriptor) {
            (ChangeKind::Add, Some(card)) => self.upsert(card).await,
            (ChangeKind::Add, None) => {
                warn!(agent_url = %event.url, "Add event without descriptor");
                Ok(())
            }
            (ChangeKind::Remove, _) => self.remove(&event.url).await,
        }
    }

    /// Rebuild the collection from `cards`; returns how many were mirrored
    ///
    /// The collection is cleared first, which drops documents of agents that
    /// left while nothing followed the registry. If clearing fails the cards
    /// are still upserted.
    pub async fn sync_all(&self, cards: &[AgentCard]) -> usize {
        let cleared = async {
            self.index.delete_all(&self.config.collection).await?;
            self.index
                .add_documents(&self.config.collection, vec![placeholder()])
                .await
        }
        .await;
        if let Err(e) = cleared {
            self.record_failure(MirrorOp::Sync);
            warn!(collection = %self.config.collection, error = %e, "Failed to clear mirror collection");
        }

        let mut synced = 0;
        for card in cards {
            match self.upsert(card).await {
                Ok(()) => synced += 1,
                Err(e) => {
                    self.record_failure(MirrorOp::Sync);
                    warn!(agent_url = %card.url, error = %e, "Mirror sync failed");
                }
            }
        }
        info!(synced, total = cards.len(), "Mirror sync finished");
        synced
    }

    /// Follow `registry`: sync its current snapshot, then apply every change
    pub fn start(self: Arc<Self>, registry: &Arc<Registry>) -> MirrorHandle {
        let (tx, mut rx) = mpsc::channel::<ChangeEvent>(self.config.queue_capacity.max(1));
        let overflowed = Arc::new(AtomicBool::new(false));
        let snapshot = registry.list_live();

        let flag = Arc::clone(&overflowed);
        let watch = registry.watch(
            move |event: &ChangeEvent| -> Result<Dispatch, HandlerError> {
                match tx.try_send(event.clone()) {
                    Ok(()) => Ok(Dispatch::Done),
                    Err(TrySendError::Full(event)) => {
                        if !flag.swap(true, Ordering::AcqRel) {
                            warn!(agent_url = %event.url, "Mirror queue full; resyncing");
                        }
                        Ok(Dispatch::Done)
                    }
                    Err(TrySendError::Closed(_)) => Err(HandlerError::from("mirror worker is gone")),
                }
            },
            &ChangeKind::ALL,
        );

        let mirror = self;
        let registry = Arc::clone(registry);
        let worker = tokio::spawn(async move {
            mirror.sync_all(&snapshot).await;
            while let Some(event) = rx.recv().await {
                if overflowed.swap(false, Ordering::AcqRel) {
                    let mut dropped = 1;
                    while rx.try_recv().is_ok() {
                        dropped += 1;
                    }
                    info!(dropped, "Rebuilding mirror after queue overflow");
                    mirror.sync_all(&registry.list_live()).await;
                    continue;
                }
                if let Err(e) = mirror.apply(&event).await {
                    warn!(
                        agent_url = %event.url,
                        kind = event.kind.as_str(),
                        error = %e,
                        "Mirror update failed"
                    );
                }
            }
            debug!("Mirror worker stopped");
        });

        MirrorHandle { watch, worker }
    }

    fn record_failure(&self, op: MirrorOp) {
        if let Some(metrics) = &self.metrics {
            metrics.record_mirror_failure(op);
        }
    }
}

/// Running mirror; stop it to drain pending changes and exit
#[must_use = "dropping the handle stops the mirror"]
pub struct MirrorHandle {
    watch: WatchHandle,
    worker: JoinHandle<()>,
}

impl MirrorHandle {
    /// Stop following changes, apply what is queued, then exit
    pub async fn stop(self) {
        self.watch.stop().await;
        if let Err(e) = self.worker.await
            && e.is_panic()
        {
            error!("Mirror worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_vector::{MemoryIndex, SearchQuery};

    fn card(name: &str, url: &str, description: &str) -> AgentCard {
        AgentCard::new(name, url).with_description(description)
    }

    async fn mirror() -> (Arc<MemoryIndex>, SemanticMirror) {
        let index = Arc::new(MemoryIndex::new());
        let mirror = SemanticMirror::new(index.clone(), MirrorConfig::default());
        mirror.ensure_collection().await.unwrap();
        (index, mirror)
    }

    fn urls(index: &MemoryIndex) -> Vec<String> {
        let mut urls: Vec<String> = index
            .documents("agent_cards")
            .iter()
            .filter_map(|d| d.metadata_str(AGENT_URL_FIELD))
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();
        urls.sort();
        urls
    }

    #[test]
    fn test_document_layout() {
        let doc = SemanticMirror::document_for(&card("A", "http://a:1", "foo")).unwrap();
        assert_eq!(doc.page_content, "A\nfoo\nhttp://a:1");
        assert_eq!(doc.metadata_str(AGENT_URL_FIELD), Some("http://a:1"));
        assert_eq!(doc.metadata[AGENT_FIELD]["name"], "A");
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent() {
        let (index, mirror) = mirror().await;
        mirror.upsert(&card("A", "http://a:1", "foo")).await.unwrap();
        mirror.ensure_collection().await.unwrap();
        assert_eq!(urls(&index), vec!["http://a:1"]);
    }

    #[tokio::test]
    async fn test_duplicate_adds_keep_one_document() {
        let (index, mirror) = mirror().await;
        let event = ChangeEvent::add(card("A", "http://a:1", "foo"));
        mirror.apply(&event).await.unwrap();
        mirror.apply(&event).await.unwrap();
        mirror
            .apply(&ChangeEvent::add(card("A", "http://a:1", "bar")))
            .await
            .unwrap();

        assert_eq!(urls(&index), vec!["http://a:1"]);
        let doc = index
            .documents("agent_cards")
            .into_iter()
            .find(|d| d.metadata_str(AGENT_URL_FIELD) == Some("http://a:1"))
            .unwrap();
        assert!(doc.page_content.contains("bar"));
    }

    #[tokio::test]
    async fn test_remove_deletes_by_url() {
        let (index, mirror) = mirror().await;
        mirror.upsert(&card("A", "http://a:1", "foo")).await.unwrap();
        mirror.upsert(&card("B", "http://b:1", "bar")).await.unwrap();

        mirror.apply(&ChangeEvent::remove("http://a:1")).await.unwrap();

        assert_eq!(urls(&index), vec!["http://b:1"]);
        let hits = index
            .search("agent_cards", &SearchQuery::new("foo"))
            .await
            .unwrap();
        assert!(hits.result.iter().all(|h| h.metadata_str(AGENT_URL_FIELD) != Some("http://a:1")));
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let index = Arc::new(MemoryIndex::new());
        let metrics = FleetMetrics::new().unwrap();
        let mirror = SemanticMirror::new(index, MirrorConfig::new("missing"))
            .with_metrics(metrics.clone());

        assert!(mirror.upsert(&card("A", "http://a:1", "foo")).await.is_err());
        assert_eq!(mirror.sync_all(&[card("A", "http://a:1", "foo")]).await, 0);

        let text = metrics.encode().unwrap();
        assert!(text.contains("fleet_mirror_failures_total{op=\"upsert\"} 2"));
        assert!(text.contains("fleet_mirror_failures_total{op=\"sync\"} 2"));
    }

    #[tokio::test]
    async fn test_sync_all_drops_departed_agents() {
        let (index, mirror) = mirror().await;
        mirror.upsert(&card("Gone", "http://gone:1", "left while down")).await.unwrap();
        mirror.upsert(&card("A", "http://a:1", "foo")).await.unwrap();

        let synced = mirror
            .sync_all(&[card("A", "http://a:1", "foo"), card("B", "http://b:1", "bar")])
            .await;

        assert_eq!(synced, 2);
        assert_eq!(urls(&index), vec!["http://a:1", "http://b:1"]);
        assert_eq!(
            index
                .documents("agent_cards")
                .iter()
                .filter(|d| d.metadata_str(AGENT_URL_FIELD) == Some(""))
                .count(),
            1
        );
        let hits = index
            .search("agent_cards", &SearchQuery::new("left while down"))
            .await
            .unwrap();
        assert!(hits.result.iter().all(|h| h.metadata_str(AGENT_URL_FIELD) != Some("http://gone:1")));
    }
}

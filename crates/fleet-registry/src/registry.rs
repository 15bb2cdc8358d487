//! Registry core
//!
//! The authoritative live set is the `expert_agents` hash plus the
//! `agent_heartbeats` sorted set in the substrate. [`Registry`] keeps an
//! in-memory replica of it, follows keyspace notifications on
//! `expert_agents:<url>` marker keys to fan changes out to handlers, and
//! runs the reaper that evicts agents whose heartbeat went stale.
//!
//! ```text
//!  workers ──hset/zadd/set──▶ substrate ──keyspace set/del──▶ fan-out worker
//!                                 ▲                               │
//!                                 │ pipeline delete               ▼
//!                              reaper ────────prune────────▶   replica ──▶ handlers
//! ```

use fleet_a2a::AgentCard;
use fleet_kv::{KeyEvent, KeyOp, KeyspaceChannel, KvStore};
use fleet_observability::FleetMetrics;
use futures::{FutureExt, StreamExt};
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{HEARTBEAT_KEY, REGISTRY_KEY, RegistryConfig, marker_key};
use crate::error::{RegistryError, RegistryResult};
use crate::event::{ChangeEvent, ChangeHandler, ChangeKind, Dispatch};
use crate::replica::Replica;

/// Current wall-clock time in unix seconds, the heartbeat score unit
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Handle to a background worker; dropping it stops the worker too
#[must_use = "dropping the handle stops the worker"]
#[derive(Debug)]
pub struct WorkerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Handle returned by [`Registry::watch`]
pub type WatchHandle = WorkerHandle;

/// Handle returned by [`Registry::start_reaper`]
pub type ReaperHandle = WorkerHandle;

impl WorkerHandle {
    pub(crate) fn spawn<F, Fut>(worker: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(worker(stop_rx));
        Self { stop, task }
    }

    /// Signal the worker and wait for it to exit
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            error!("Background worker panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Resolves when the stop flag flips or the handle is gone
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

/// Live agent registry over a [`KvStore`]
pub struct Registry {
    store: Arc<dyn KvStore>,
    config: RegistryConfig,
    replica: Replica,
    channels: KeyspaceChannel,
    metrics: Option<FleetMetrics>,
}

impl Registry {
    /// Create an unloaded registry; call [`Registry::bootstrap`] next
    pub fn new(store: Arc<dyn KvStore>, config: RegistryConfig) -> Self {
        let channels = KeyspaceChannel::new(store.db(), REGISTRY_KEY);
        Self {
            store,
            config,
            replica: Replica::default(),
            channels,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: FleetMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enable keyspace notifications and load the replica
    ///
    /// A failure to enable notifications is logged only; an operator may
    /// have enabled them already. Undecodable descriptors are skipped.
    pub async fn bootstrap(self) -> RegistryResult<Arc<Self>> {
        if let Err(e) = self.store.configure_notifications().await {
            warn!(
                error = %e,
                "Could not enable keyspace notifications; enable notify-keyspace-events KEA manually"
            );
        }

        let mut cards = Vec::new();
        for url in self.store.hkeys(REGISTRY_KEY).await? {
            if let Some(card) = self.get(&url).await? {
                cards.push(card);
            }
        }
        self.replica.replace(cards);
        self.publish_size();

        info!(agents = self.replica.len(), "Registry bootstrapped");
        Ok(Arc::new(self))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn metrics(&self) -> Option<&FleetMetrics> {
        self.metrics.as_ref()
    }

    /// Read the descriptor stored for `url`
    ///
    /// Malformed descriptors, including one whose `url` disagrees with its
    /// key, read as `None`.
    pub async fn get(&self, url: &str) -> RegistryResult<Option<AgentCard>> {
        let Some(payload) = self.store.hget(REGISTRY_KEY, url).await? else {
            return Ok(None);
        };
        match decode_descriptor(url, &payload) {
            Ok(card) => Ok(Some(card)),
            Err(e) => {
                warn!(agent_url = %url, error = %e, "Skipping undecodable descriptor");
                Ok(None)
            }
        }
    }

    /// Snapshot of the live descriptors
    pub fn list_live(&self) -> Arc<Vec<AgentCard>> {
        self.replica.snapshot()
    }

    pub fn len(&self) -> usize {
        self.replica.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replica.is_empty()
    }

    /// Check substrate connectivity
    pub async fn ping(&self) -> RegistryResult<()> {
        Ok(self.store.ping().await?)
    }

    /// Evict agents whose heartbeat is older than the timeout, now
    pub async fn reap_once(&self) -> RegistryResult<usize> {
        self.reap_at(unix_now()).await
    }

    /// Evict agents whose heartbeat is older than the timeout at `now`
    ///
    /// Scans every url known to either key. A url without a heartbeat
    /// entry is kept unless `require_heartbeat` is set. Expired urls leave
    /// all three keys in one atomic batch before the replica is pruned.
    pub async fn reap_at(&self, now: f64) -> RegistryResult<usize> {
        let mut urls: BTreeSet<String> = self.store.hkeys(REGISTRY_KEY).await?.into_iter().collect();
        urls.extend(self.store.zrange_all(HEARTBEAT_KEY).await?);

        let timeout = self.config.heartbeat_timeout.as_secs_f64();
        let mut expired = Vec::new();
        for url in urls {
            match self.store.zscore(HEARTBEAT_KEY, &url).await? {
                Some(last_seen) if now - last_seen > timeout => {
                    debug!(agent_url = %url, idle_secs = now - last_seen, "Heartbeat expired");
                    expired.push(url);
                }
                None if self.config.require_heartbeat => {
                    debug!(agent_url = %url, "No heartbeat recorded");
                    expired.push(url);
                }
                _ => {}
            }
        }

        if expired.is_empty() {
            return Ok(0);
        }

        self.store.execute(delete_batch(self.store.as_ref(), &expired)).await?;
        self.replica.remove_all(&expired);
        self.publish_size();
        if let Some(metrics) = &self.metrics {
            metrics.record_reaped(expired.len());
        }

        info!(count = expired.len(), agents = ?expired, "Reaped expired agents");
        Ok(expired.len())
    }

    /// Remove `url` from the registry; returns whether it was registered
    pub async fn deregister(&self, url: &str) -> RegistryResult<bool> {
        let existed = self.store.hget(REGISTRY_KEY, url).await?.is_some();
        self.store
            .execute(delete_batch(self.store.as_ref(), &[url.to_string()]))
            .await?;
        self.replica.remove(url);
        self.publish_size();
        info!(agent_url = %url, existed, "Agent deregistered");
        Ok(existed)
    }

    /// Run the reaper: sweep, then sleep `reap_interval`; `reap_retry` after a failure
    pub fn start_reaper(self: &Arc<Self>) -> ReaperHandle {
        let registry = Arc::clone(self);
        WorkerHandle::spawn(move |mut stop| async move {
            info!(
                interval_secs = registry.config.reap_interval.as_secs(),
                timeout_secs = registry.config.heartbeat_timeout.as_secs(),
                "Reaper started"
            );
            loop {
                let pause = match registry.reap_once().await {
                    Ok(_) => registry.config.reap_interval,
                    Err(e) => {
                        error!(error = %e, "Reaper sweep failed");
                        registry.config.reap_retry
                    }
                };
                tokio::select! {
                    _ = stopped(&mut stop) => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
            debug!("Reaper stopped");
        })
    }

    /// Deliver changes of the requested `kinds` to `handler`
    ///
    /// The replica is updated before the handler sees an event. On a lost
    /// subscription the worker rebuilds it after `min(base * 2^attempt, cap)`
    /// and reconciles against the substrate, emitting events for whatever
    /// changed while it was away. Reconciliation diffs against the urls this
    /// handler was last told about, so agents the reaper or [`Registry::deregister`]
    /// pruned during the gap still reach it as removals.
    pub fn watch<H: ChangeHandler>(self: &Arc<Self>, handler: H, kinds: &[ChangeKind]) -> WatchHandle {
        let registry = Arc::clone(self);
        let kinds = kinds.to_vec();
        let known: BTreeSet<String> = self.replica.urls().into_iter().collect();
        WorkerHandle::spawn(move |stop| registry.run_watch(handler, kinds, known, stop))
    }

    async fn run_watch<H: ChangeHandler>(
        self: Arc<Self>,
        handler: H,
        kinds: Vec<ChangeKind>,
        mut known: BTreeSet<String>,
        mut stop: watch::Receiver<bool>,
    ) {
        let pattern = self.channels.pattern();
        let mut attempt: u32 = 0;

        loop {
            let subscribed = tokio::select! {
                _ = stopped(&mut stop) => break,
                subscribed = self.store.subscribe_key_events(&pattern) => subscribed,
            };

            match subscribed {
                Ok(mut events) => {
                    if attempt > 0 {
                        info!(attempt, "Keyspace subscription restored");
                        if let Some(metrics) = &self.metrics {
                            metrics.record_reconnect();
                        }
                    } else {
                        debug!(pattern = %pattern, "Watching registry changes");
                    }
                    attempt = 0;

                    if let Err(e) = self.reconcile(&handler, &kinds, &mut known).await {
                        warn!(error = %e, "Replica reconciliation failed");
                    }

                    loop {
                        let next = tokio::select! {
                            _ = stopped(&mut stop) => return,
                            next = events.next() => next,
                        };
                        match next {
                            Some(Ok(event)) => {
                                self.handle_event(&event, &handler, &kinds, &mut known).await
                            }
                            Some(Err(e)) if e.is_transient() => {
                                warn!(error = %e, "Keyspace subscription failed");
                                break;
                            }
                            Some(Err(e)) => warn!(error = %e, "Skipping malformed notification"),
                            None => {
                                warn!("Keyspace subscription closed");
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!(attempt, error = %e, "Failed to subscribe to keyspace events"),
            }

            let delay = self.config.backoff(attempt);
            attempt = attempt.saturating_add(1);
            debug!(delay_ms = delay.as_millis() as u64, "Reconnecting keyspace subscription");
            tokio::select! {
                _ = stopped(&mut stop) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("Watch worker stopped");
    }

    async fn handle_event<H: ChangeHandler>(
        &self,
        event: &KeyEvent,
        handler: &H,
        kinds: &[ChangeKind],
        known: &mut BTreeSet<String>,
    ) {
        let Some(url) = self.channels.parse(&event.channel) else {
            debug!(channel = %event.channel, "Ignoring foreign notification");
            return;
        };

        match event.op {
            KeyOp::Set => match self.get(url).await {
                Ok(Some(card)) => {
                    if self.replica.insert_if_absent(card.clone()) {
                        self.publish_size();
                    }
                    known.insert(card.url.clone());
                    self.deliver(handler, kinds, ChangeEvent::add(card));
                }
                Ok(None) => debug!(agent_url = %url, "Marker set without a readable descriptor"),
                Err(e) => warn!(agent_url = %url, error = %e, "Failed to read announced descriptor"),
            },
            KeyOp::Del => {
                if self.replica.remove(url) {
                    self.publish_size();
                }
                known.remove(url);
                self.deliver(handler, kinds, ChangeEvent::remove(url));
            }
            _ => {}
        }
    }

    /// Bring the replica and one handler's view in line with the substrate
    ///
    /// `known` holds the urls the handler last saw added and not removed.
    async fn reconcile<H: ChangeHandler>(
        &self,
        handler: &H,
        kinds: &[ChangeKind],
        known: &mut BTreeSet<String>,
    ) -> RegistryResult<()> {
        let stored: BTreeSet<String> = self.store.hkeys(REGISTRY_KEY).await?.into_iter().collect();

        let mut vanished: BTreeSet<String> = known.difference(&stored).cloned().collect();
        vanished.extend(self.replica.urls().into_iter().filter(|url| !stored.contains(url)));
        for url in vanished {
            self.replica.remove(&url);
            known.remove(&url);
            debug!(agent_url = %url, "Vanished while unobserved");
            self.deliver(handler, kinds, ChangeEvent::remove(url));
        }

        for url in stored {
            if known.contains(&url) {
                continue;
            }
            if let Some(card) = self.get(&url).await? {
                self.replica.insert_if_absent(card.clone());
                known.insert(url.clone());
                debug!(agent_url = %url, "Appeared while unobserved");
                self.deliver(handler, kinds, ChangeEvent::add(card));
            }
        }

        self.publish_size();
        Ok(())
    }

    fn deliver<H: ChangeHandler>(&self, handler: &H, kinds: &[ChangeKind], event: ChangeEvent) {
        if !kinds.contains(&event.kind) {
            return;
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_change(event.kind.as_str());
        }
        dispatch(handler, &event);
    }

    fn publish_size(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_live_agents(self.replica.len());
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("agents", &self.replica.len())
            .finish_non_exhaustive()
    }
}

/// Decode a stored descriptor, rejecting one filed under another url
pub fn decode_descriptor(url: &str, payload: &str) -> RegistryResult<AgentCard> {
    let card = AgentCard::from_json(payload)
        .map_err(|e| RegistryError::invalid_descriptor(url, e.to_string()))?;
    if card.url != url {
        return Err(RegistryError::invalid_descriptor(
            url,
            format!("descriptor names url {:?}", card.url),
        ));
    }
    Ok(card)
}

/// The three-key delete shared by the reaper and deregistration
pub(crate) fn delete_batch(store: &dyn KvStore, urls: &[String]) -> fleet_kv::Batch {
    let mut batch = store.pipeline();
    for url in urls {
        batch
            .hdel(REGISTRY_KEY, url)
            .zrem(HEARTBEAT_KEY, url)
            .del(&marker_key(url));
    }
    batch
}

/// Invoke `handler`, containing errors and panics
fn dispatch<H: ChangeHandler>(handler: &H, event: &ChangeEvent) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler.on_change(event)));
    match outcome {
        Ok(Ok(Dispatch::Done)) => {}
        Ok(Ok(Dispatch::Deferred(work))) => {
            let url = event.url.clone();
            let kind = event.kind;
            tokio::spawn(async move {
                match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(agent_url = %url, kind = kind.as_str(), error = %e, "Deferred change handler failed")
                    }
                    Err(_) => {
                        error!(agent_url = %url, kind = kind.as_str(), "Deferred change handler panicked")
                    }
                }
            });
        }
        Ok(Err(e)) => {
            warn!(agent_url = %event.url, kind = event.kind.as_str(), error = %e, "Change handler failed")
        }
        Err(_) => {
            error!(agent_url = %event.url, kind = event.kind.as_str(), "Change handler panicked")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::AgentPublisher;
    use fleet_kv::MemoryStore;
    use std::time::Duration;

    fn card(name: &str, url: &str) -> AgentCard {
        AgentCard::new(name, url).with_description(format!("{name} agent"))
    }

    async fn seeded(cards: &[AgentCard]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for card in cards {
            store
                .hset(REGISTRY_KEY, &card.url, &card.to_json().unwrap())
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_bootstrap_loads_replica_and_enables_notifications() {
        let store = seeded(&[card("A", "http://a:1"), card("B", "http://b:1")]).await;
        store.hset(REGISTRY_KEY, "http://bad:1", "{not json").await.unwrap();

        let registry = Registry::new(store.clone(), RegistryConfig::default())
            .bootstrap()
            .await
            .unwrap();

        assert!(store.notifications_enabled());
        let live = registry.list_live();
        let mut urls: Vec<&str> = live.iter().map(|c| c.url.as_str()).collect();
        urls.sort();
        assert_eq!(urls, vec!["http://a:1", "http://b:1"]);
    }

    #[tokio::test]
    async fn test_get_treats_malformed_as_absent() {
        let store = seeded(&[card("A", "http://a:1")]).await;
        store.hset(REGISTRY_KEY, "http://bad:1", "[]").await.unwrap();
        store
            .hset(REGISTRY_KEY, "http://other:1", &card("C", "http://c:1").to_json().unwrap())
            .await
            .unwrap();
        let registry = Registry::new(store, RegistryConfig::default());

        assert_eq!(registry.get("http://a:1").await.unwrap().unwrap().name, "A");
        assert!(registry.get("http://bad:1").await.unwrap().is_none());
        assert!(registry.get("http://other:1").await.unwrap().is_none());
        assert!(registry.get("http://missing:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reap_evicts_only_stale_heartbeats() {
        let store = seeded(&[
            card("Fresh", "http://fresh:1"),
            card("Stale", "http://stale:1"),
            card("Silent", "http://silent:1"),
        ])
        .await;
        let now = 1_000.0;
        store.zadd(HEARTBEAT_KEY, "http://fresh:1", now - 10.0).await.unwrap();
        store.zadd(HEARTBEAT_KEY, "http://stale:1", now - 31.0).await.unwrap();
        store.set(&marker_key("http://stale:1"), "1").await.unwrap();

        let registry = Registry::new(store.clone(), RegistryConfig::default())
            .bootstrap()
            .await
            .unwrap();
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.reap_at(now).await.unwrap(), 1);

        assert!(store.hget(REGISTRY_KEY, "http://stale:1").await.unwrap().is_none());
        assert!(store.zscore(HEARTBEAT_KEY, "http://stale:1").await.unwrap().is_none());
        assert!(!store.del(&marker_key("http://stale:1")).await.unwrap());

        let live: Vec<String> = registry.list_live().iter().map(|c| c.url.clone()).collect();
        assert!(live.contains(&"http://fresh:1".to_string()));
        assert!(live.contains(&"http://silent:1".to_string()));
        assert_eq!(live.len(), 2);

        assert_eq!(registry.reap_at(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_at_exact_timeout_is_live() {
        let store = seeded(&[card("A", "http://a:1")]).await;
        store.zadd(HEARTBEAT_KEY, "http://a:1", 70.0).await.unwrap();
        let registry = Registry::new(store, RegistryConfig::default());

        assert_eq!(registry.reap_at(100.0).await.unwrap(), 0);
        assert_eq!(registry.reap_at(100.5).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_orphan_heartbeat_is_reaped() {
        let store = Arc::new(MemoryStore::new());
        store.zadd(HEARTBEAT_KEY, "http://ghost:1", 0.0).await.unwrap();
        let registry = Registry::new(store.clone(), RegistryConfig::default());

        assert_eq!(registry.reap_at(100.0).await.unwrap(), 1);
        assert!(store.zrange_all(HEARTBEAT_KEY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_require_heartbeat_reaps_silent_agents() {
        let store = seeded(&[card("Silent", "http://silent:1")]).await;
        let registry = Registry::new(
            store.clone(),
            RegistryConfig::default().with_require_heartbeat(true),
        )
        .bootstrap()
        .await
        .unwrap();

        assert_eq!(registry.reap_at(unix_now()).await.unwrap(), 1);
        assert!(registry.is_empty());
        assert!(store.hkeys(REGISTRY_KEY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deregister() {
        let store = Arc::new(MemoryStore::new());
        let publisher = AgentPublisher::new(store.clone());
        publisher.register(&card("A", "http://a:1")).await.unwrap();

        let registry = Registry::new(store.clone(), RegistryConfig::default())
            .with_metrics(FleetMetrics::new().unwrap())
            .bootstrap()
            .await
            .unwrap();
        assert_eq!(registry.metrics().unwrap().live_agents(), 1);

        assert!(registry.deregister("http://a:1").await.unwrap());
        assert!(registry.is_empty());
        assert!(!publisher.is_registered("http://a:1").await.unwrap());
        assert_eq!(registry.metrics().unwrap().live_agents(), 0);

        assert!(!registry.deregister("http://a:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_reaper_worker_sweeps_and_stops() {
        let store = seeded(&[card("A", "http://a:1")]).await;
        store.zadd(HEARTBEAT_KEY, "http://a:1", 0.0).await.unwrap();
        let registry = Registry::new(
            store.clone(),
            RegistryConfig::default().with_reap_interval(Duration::from_millis(20)),
        )
        .bootstrap()
        .await
        .unwrap();

        let reaper = registry.start_reaper();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reaper should evict the stale agent");

        reaper.stop().await;
    }

    #[test]
    fn test_decode_descriptor_checks_key() {
        let json = card("A", "http://a:1").to_json().unwrap();
        assert!(decode_descriptor("http://a:1", &json).is_ok());
        assert!(matches!(
            decode_descriptor("http://b:1", &json),
            Err(RegistryError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_unix_now_is_seconds() {
        let now = unix_now();
        assert!(now > 1_600_000_000.0);
        assert!(now < 10_000_000_000.0);
    }
}

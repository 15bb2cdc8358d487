//! Worker-side registration
//!
//! [`AgentPublisher`] performs the writes an expert agent makes to join,
//! stay in, and leave the fleet. [`HeartbeatService`] keeps a set of
//! registered agents alive and re-registers any the reaper evicted while
//! the worker was stalled.

use fleet_a2a::AgentCard;
use fleet_kv::KvStore;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{HEARTBEAT_KEY, HeartbeatConfig, REGISTRY_KEY, marker_key};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::{WorkerHandle, delete_batch, unix_now};

/// Writes registrations and heartbeats the way workers do
#[derive(Clone)]
pub struct AgentPublisher {
    store: Arc<dyn KvStore>,
}

impl AgentPublisher {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Publish `card` with a fresh heartbeat
    ///
    /// Descriptor, heartbeat and marker key go in one atomic batch; the
    /// marker write is what announces the agent to watchers.
    pub async fn register(&self, card: &AgentCard) -> RegistryResult<()> {
        card.validate()
            .map_err(|e| RegistryError::invalid_descriptor(&card.url, e.to_string()))?;
        let payload = serde_json::to_string(card)?;

        let mut batch = self.store.pipeline();
        batch
            .hset(REGISTRY_KEY, &card.url, &payload)
            .zadd(HEARTBEAT_KEY, &card.url, unix_now())
            .set(&marker_key(&card.url), "1");
        self.store.execute(batch).await?;

        info!(agent_url = %card.url, agent = %card.name, "Agent registered");
        Ok(())
    }

    pub async fn heartbeat(&self, url: &str) -> RegistryResult<()> {
        self.store.zadd(HEARTBEAT_KEY, url, unix_now()).await?;
        Ok(())
    }

    /// Refresh the heartbeat of every url in one batch
    pub async fn heartbeat_all(&self, urls: &[String]) -> RegistryResult<()> {
        if urls.is_empty() {
            return Ok(());
        }
        let now = unix_now();
        let mut batch = self.store.pipeline();
        for url in urls {
            batch.zadd(HEARTBEAT_KEY, url, now);
        }
        self.store.execute(batch).await?;
        Ok(())
    }

    pub async fn unregister(&self, url: &str) -> RegistryResult<()> {
        self.store
            .execute(delete_batch(self.store.as_ref(), &[url.to_string()]))
            .await?;
        info!(agent_url = %url, "Agent unregistered");
        Ok(())
    }

    pub async fn is_registered(&self, url: &str) -> RegistryResult<bool> {
        Ok(self.store.hget(REGISTRY_KEY, url).await?.is_some())
    }
}

struct HeartbeatState {
    publisher: AgentPublisher,
    config: HeartbeatConfig,
    tracked: Mutex<BTreeMap<String, AgentCard>>,
}

impl HeartbeatState {
    fn tracked(&self) -> MutexGuard<'_, BTreeMap<String, AgentCard>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn urls(&self) -> Vec<String> {
        self.tracked().keys().cloned().collect()
    }

    async fn beat(&self) -> RegistryResult<()> {
        let urls = self.urls();
        self.publisher.heartbeat_all(&urls).await?;
        debug!(agents = urls.len(), "Heartbeat sent");
        Ok(())
    }

    async fn recover(&self) -> RegistryResult<usize> {
        let cards: Vec<AgentCard> = self.tracked().values().cloned().collect();
        let mut recovered = 0;
        for card in cards {
            if !self.publisher.is_registered(&card.url).await? {
                warn!(agent_url = %card.url, "Registration vanished, registering again");
                self.publisher.register(&card).await?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn run(self: Arc<Self>, mut stop: tokio::sync::watch::Receiver<bool>) {
        let mut last_recovery = Instant::now();
        loop {
            let round = async {
                if last_recovery.elapsed() >= self.config.recovery_interval {
                    last_recovery = Instant::now();
                    self.recover().await?;
                }
                self.beat().await
            };
            let pause = match round.await {
                Ok(()) => self.config.interval,
                Err(e) => {
                    error!(error = %e, "Heartbeat round failed");
                    self.config.error_backoff
                }
            };
            tokio::select! {
                _ = stop.wait_for(|stop| *stop) => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        debug!("Heartbeat service stopped");
    }
}

/// Keeps registered agents alive
pub struct HeartbeatService {
    state: Arc<HeartbeatState>,
    worker: Option<WorkerHandle>,
}

impl HeartbeatService {
    pub fn new(publisher: AgentPublisher, config: HeartbeatConfig) -> Self {
        Self {
            state: Arc::new(HeartbeatState {
                publisher,
                config,
                tracked: Mutex::new(BTreeMap::new()),
            }),
            worker: None,
        }
    }

    /// Register `card` and keep it alive from now on
    pub async fn register(&self, card: AgentCard) -> RegistryResult<()> {
        self.state.publisher.register(&card).await?;
        self.state.tracked().insert(card.url.clone(), card);
        Ok(())
    }

    /// Stop tracking `url` and remove it from the registry
    pub async fn unregister(&self, url: &str) -> RegistryResult<()> {
        self.state.tracked().remove(url);
        self.state.publisher.unregister(url).await
    }

    pub fn tracked(&self) -> Vec<String> {
        self.state.urls()
    }

    /// Send one heartbeat for every tracked agent
    pub async fn beat_once(&self) -> RegistryResult<()> {
        self.state.beat().await
    }

    /// Re-register tracked agents whose descriptor is gone; returns how many
    pub async fn recover_once(&self) -> RegistryResult<usize> {
        self.state.recover().await
    }

    /// Start the heartbeat loop; a no-op when already running
    pub fn start(&mut self) {
        if self.worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return;
        }
        let state = Arc::clone(&self.state);
        info!(
            interval_secs = state.config.interval.as_secs(),
            "Heartbeat service started"
        );
        self.worker = Some(WorkerHandle::spawn(move |stop| state.run(stop)));
    }

    /// Stop the loop and unregister every tracked agent
    pub async fn shutdown(mut self) -> RegistryResult<()> {
        if let Some(worker) = self.worker.take() {
            worker.stop().await;
        }
        let urls = self.state.urls();
        let mut first_error = None;
        for url in &urls {
            if let Err(e) = self.state.publisher.unregister(url).await {
                error!(agent_url = %url, error = %e, "Failed to unregister on shutdown");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        self.state.tracked().clear();
        info!(agents = urls.len(), "Heartbeat service shut down");
        first_error.map_or(Ok(()), Err)
    }
}

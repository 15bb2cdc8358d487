//! In-process substrate with keyspace notifications
//!
//! `MemoryStore` mirrors the Redis semantics the registry depends on: hashes,
//! sorted sets, plain keys, atomic batches and `__keyspace@<db>__:<key>`
//! notifications that are only published once notifications are enabled.
//! It also lets callers sever live subscriptions to exercise reconnect paths.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;

use crate::error::{KvError, KvResult};
use crate::keyspace::{channel_for_key, glob_match};
use crate::store::{Batch, BatchOp, KeyEvent, KeyEventStream, KeyOp, KvStore};

const EVENT_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
struct State {
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    strings: HashMap<String, String>,
}

impl State {
    /// Apply one write, returning the notification it produces, if any
    fn apply(&mut self, op: &BatchOp) -> Option<(String, &'static str)> {
        match op {
            BatchOp::HSet {
                space,
                field,
                payload,
            } => {
                self.hashes
                    .entry(space.clone())
                    .or_default()
                    .insert(field.clone(), payload.clone());
                Some((space.clone(), "hset"))
            }
            BatchOp::HDel { space, field } => {
                let removed = self
                    .hashes
                    .get_mut(space)
                    .and_then(|hash| hash.remove(field))
                    .is_some();
                if self.hashes.get(space).is_some_and(HashMap::is_empty) {
                    self.hashes.remove(space);
                }
                removed.then(|| (space.clone(), "hdel"))
            }
            BatchOp::ZAdd {
                space,
                member,
                score,
            } => {
                self.zsets
                    .entry(space.clone())
                    .or_default()
                    .insert(member.clone(), *score);
                Some((space.clone(), "zadd"))
            }
            BatchOp::ZRem { space, member } => {
                let removed = self
                    .zsets
                    .get_mut(space)
                    .and_then(|zset| zset.remove(member))
                    .is_some();
                if self.zsets.get(space).is_some_and(HashMap::is_empty) {
                    self.zsets.remove(space);
                }
                removed.then(|| (space.clone(), "zrem"))
            }
            BatchOp::Set { key, value } => {
                self.strings.insert(key.clone(), value.clone());
                Some((key.clone(), "set"))
            }
            BatchOp::Del { key } => {
                let removed = self.strings.remove(key).is_some()
                    || self.hashes.remove(key).is_some()
                    || self.zsets.remove(key).is_some();
                removed.then(|| (key.clone(), "del"))
            }
        }
    }
}

/// In-memory [`KvStore`]
pub struct MemoryStore {
    db: i64,
    state: Mutex<State>,
    events: RwLock<broadcast::Sender<KeyEvent>>,
    notifications: AtomicBool,
    subscriptions_available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store for database 0
    pub fn new() -> Self {
        Self::with_db(0)
    }

    /// Create an empty store reporting database index `db`
    pub fn with_db(db: i64) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            db,
            state: Mutex::new(State::default()),
            events: RwLock::new(tx),
            notifications: AtomicBool::new(false),
            subscriptions_available: AtomicBool::new(true),
        }
    }

    /// Drop every live subscription; their streams end as on a lost connection
    pub fn disconnect_subscribers(&self) {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        *events = tx;
        debug!("Severed all keyspace subscriptions");
    }

    /// Refuse (or accept again) new subscriptions
    pub fn set_subscriptions_available(&self, available: bool) {
        self.subscriptions_available
            .store(available, Ordering::SeqCst);
    }

    /// Whether keyspace notifications are enabled
    pub fn notifications_enabled(&self) -> bool {
        self.notifications.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .receiver_count()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, ops: &[BatchOp]) {
        let notices: Vec<(String, &'static str)> = {
            let mut state = self.state();
            ops.iter().filter_map(|op| state.apply(op)).collect()
        };

        if !self.notifications_enabled() {
            return;
        }

        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        for (key, op) in notices {
            // No receivers is not an error for a publisher
            let _ = events.send(KeyEvent::new(
                channel_for_key(self.db, &key),
                KeyOp::parse(op),
            ));
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn hset(&self, space: &str, field: &str, payload: &str) -> KvResult<()> {
        let mut batch = Batch::new();
        batch.hset(space, field, payload);
        self.write(batch.ops());
        Ok(())
    }

    async fn hget(&self, space: &str, field: &str) -> KvResult<Option<String>> {
        Ok(self
            .state()
            .hashes
            .get(space)
            .and_then(|hash| hash.get(field))
            .cloned())
    }

    async fn hdel(&self, space: &str, field: &str) -> KvResult<bool> {
        let existed = self.hget(space, field).await?.is_some();
        let mut batch = Batch::new();
        batch.hdel(space, field);
        self.write(batch.ops());
        Ok(existed)
    }

    async fn hkeys(&self, space: &str) -> KvResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .state()
            .hashes
            .get(space)
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn zadd(&self, space: &str, member: &str, score: f64) -> KvResult<()> {
        let mut batch = Batch::new();
        batch.zadd(space, member, score);
        self.write(batch.ops());
        Ok(())
    }

    async fn zrem(&self, space: &str, member: &str) -> KvResult<bool> {
        let existed = self.zscore(space, member).await?.is_some();
        let mut batch = Batch::new();
        batch.zrem(space, member);
        self.write(batch.ops());
        Ok(existed)
    }

    async fn zscore(&self, space: &str, member: &str) -> KvResult<Option<f64>> {
        Ok(self
            .state()
            .zsets
            .get(space)
            .and_then(|zset| zset.get(member))
            .copied())
    }

    async fn zrange_all(&self, space: &str) -> KvResult<Vec<String>> {
        let mut members: Vec<(String, f64)> = self
            .state()
            .zsets
            .get(space)
            .map(|zset| zset.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members.into_iter().map(|(member, _)| member).collect())
    }

    async fn set(&self, key: &str, value: &str) -> KvResult<()> {
        let mut batch = Batch::new();
        batch.set(key, value);
        self.write(batch.ops());
        Ok(())
    }

    async fn del(&self, key: &str) -> KvResult<bool> {
        let existed = {
            let state = self.state();
            state.strings.contains_key(key)
                || state.hashes.contains_key(key)
                || state.zsets.contains_key(key)
        };
        let mut batch = Batch::new();
        batch.del(key);
        self.write(batch.ops());
        Ok(existed)
    }

    async fn execute(&self, batch: Batch) -> KvResult<()> {
        self.write(batch.ops());
        Ok(())
    }

    async fn configure_notifications(&self) -> KvResult<()> {
        self.notifications.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe_key_events(&self, pattern: &str) -> KvResult<KeyEventStream> {
        if !self.subscriptions_available.load(Ordering::SeqCst) {
            return Err(KvError::ConnectionFailed(
                "substrate refused subscription".to_string(),
            ));
        }

        let receiver = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe();
        let pattern = pattern.to_string();

        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let item = match item {
                Ok(event) if glob_match(&pattern, &event.channel) => Some(Ok(event)),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(missed)) => Some(Err(
                    KvError::SubscribeFailed(format!("subscriber lagged by {missed} events")),
                )),
            };
            futures::future::ready(item)
        });

        Ok(Box::pin(stream))
    }

    async fn ping(&self) -> KvResult<()> {
        Ok(())
    }

    fn db(&self) -> i64 {
        self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_hash_and_zset_operations() {
        let store = MemoryStore::new();
        store.hset("reg", "a", "1").await.unwrap();
        store.hset("reg", "b", "2").await.unwrap();
        assert_eq!(store.hget("reg", "a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.hkeys("reg").await.unwrap(), vec!["a", "b"]);
        assert!(store.hdel("reg", "a").await.unwrap());
        assert!(!store.hdel("reg", "a").await.unwrap());

        store.zadd("hb", "late", 20.0).await.unwrap();
        store.zadd("hb", "early", 10.0).await.unwrap();
        assert_eq!(store.zrange_all("hb").await.unwrap(), vec!["early", "late"]);
        assert_eq!(store.zscore("hb", "late").await.unwrap(), Some(20.0));
        assert!(store.zrem("hb", "late").await.unwrap());
        assert_eq!(store.zscore("hb", "late").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_notifications_until_configured() {
        let store = MemoryStore::new();
        let mut events = store
            .subscribe_key_events("__keyspace@0__:reg:*")
            .await
            .unwrap();

        store.set("reg:x", "1").await.unwrap();
        assert!(
            timeout(Duration::from_millis(50), events.next())
                .await
                .is_err()
        );

        store.configure_notifications().await.unwrap();
        store.set("reg:y", "1").await.unwrap();
        let event = timeout(Duration::from_secs(1), events.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.channel, "__keyspace@0__:reg:y");
        assert_eq!(event.op, KeyOp::Set);
    }

    #[tokio::test]
    async fn test_batch_emits_in_order_and_filters_pattern() {
        let store = MemoryStore::new();
        store.configure_notifications().await.unwrap();
        store.set("reg:x", "1").await.unwrap();

        let mut events = store
            .subscribe_key_events("__keyspace@0__:reg:*")
            .await
            .unwrap();

        let mut batch = store.pipeline();
        batch.hdel("reg", "x").zrem("hb", "x").del("reg:x").del("reg:missing");
        store.execute(batch).await.unwrap();

        let event = timeout(Duration::from_secs(1), events.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.channel, "__keyspace@0__:reg:x");
        assert_eq!(event.op, KeyOp::Del);

        // Deleting a missing key publishes nothing
        assert!(
            timeout(Duration::from_millis(50), events.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream_and_refusal() {
        let store = MemoryStore::new();
        let mut events = store.subscribe_key_events("*").await.unwrap();
        assert_eq!(store.subscriber_count(), 1);

        store.disconnect_subscribers();
        let next = timeout(Duration::from_secs(1), events.next()).await.unwrap();
        assert!(next.is_none());

        store.set_subscriptions_available(false);
        let refused = store.subscribe_key_events("*").await;
        assert!(matches!(refused, Err(KvError::ConnectionFailed(_))));

        store.set_subscriptions_available(true);
        assert!(store.subscribe_key_events("*").await.is_ok());
    }
}

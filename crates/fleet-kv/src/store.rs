//! Core `KvStore` trait and the atomic write batch

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::KvResult;

/// Stream of keyspace notifications delivered to a subscriber
///
/// The stream ends when the underlying connection is lost. Subscribers that
/// need continuity resubscribe.
pub type KeyEventStream = Pin<Box<dyn Stream<Item = KvResult<KeyEvent>> + Send + 'static>>;

/// Operation reported by a keyspace notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOp {
    Set,
    Del,
    Expire,
    Expired,
    Other(String),
}

impl KeyOp {
    /// Map a notification payload (`set`, `del`, `hset`, ...) to an operation
    pub fn parse(payload: &str) -> Self {
        match payload {
            "set" => KeyOp::Set,
            "del" => KeyOp::Del,
            "expire" => KeyOp::Expire,
            "expired" => KeyOp::Expired,
            other => KeyOp::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeyOp::Set => "set",
            KeyOp::Del => "del",
            KeyOp::Expire => "expire",
            KeyOp::Expired => "expired",
            KeyOp::Other(op) => op,
        }
    }
}

/// A single keyspace notification: the channel it arrived on and its operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub channel: String,
    pub op: KeyOp,
}

impl KeyEvent {
    pub fn new(channel: impl Into<String>, op: KeyOp) -> Self {
        Self {
            channel: channel.into(),
            op,
        }
    }
}

/// One write inside a [`Batch`]
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    HSet {
        space: String,
        field: String,
        payload: String,
    },
    HDel {
        space: String,
        field: String,
    },
    ZAdd {
        space: String,
        member: String,
        score: f64,
    },
    ZRem {
        space: String,
        member: String,
    },
    Set {
        key: String,
        value: String,
    },
    Del {
        key: String,
    },
}

/// Ordered group of writes applied atomically by [`KvStore::execute`]
///
/// ```rust
/// use fleet_kv::Batch;
///
/// let mut batch = Batch::new();
/// batch
///     .hdel("expert_agents", "http://a:1")
///     .zrem("agent_heartbeats", "http://a:1")
///     .del("expert_agents:http://a:1");
/// assert_eq!(batch.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hset(&mut self, space: &str, field: &str, payload: &str) -> &mut Self {
        self.ops.push(BatchOp::HSet {
            space: space.to_string(),
            field: field.to_string(),
            payload: payload.to_string(),
        });
        self
    }

    pub fn hdel(&mut self, space: &str, field: &str) -> &mut Self {
        self.ops.push(BatchOp::HDel {
            space: space.to_string(),
            field: field.to_string(),
        });
        self
    }

    pub fn zadd(&mut self, space: &str, member: &str, score: f64) -> &mut Self {
        self.ops.push(BatchOp::ZAdd {
            space: space.to_string(),
            member: member.to_string(),
            score,
        });
        self
    }

    pub fn zrem(&mut self, space: &str, member: &str) -> &mut Self {
        self.ops.push(BatchOp::ZRem {
            space: space.to_string(),
            member: member.to_string(),
        });
        self
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.ops.push(BatchOp::Set {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn del(&mut self, key: &str) -> &mut Self {
        self.ops.push(BatchOp::Del {
            key: key.to_string(),
        });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Capability surface over a key/value store with hashes, sorted sets,
/// atomic batches and keyspace notifications
///
/// Implementations must be safe to share between tasks. Keyspace
/// subscriptions use a dedicated connection per call.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set `field` of hash `space` to `payload`
    async fn hset(&self, space: &str, field: &str, payload: &str) -> KvResult<()>;

    /// Read `field` of hash `space`
    async fn hget(&self, space: &str, field: &str) -> KvResult<Option<String>>;

    /// Remove `field` from hash `space`, returning whether it existed
    async fn hdel(&self, space: &str, field: &str) -> KvResult<bool>;

    /// All field names of hash `space`
    async fn hkeys(&self, space: &str) -> KvResult<Vec<String>>;

    /// Add or update `member` of sorted set `space` with `score`
    async fn zadd(&self, space: &str, member: &str, score: f64) -> KvResult<()>;

    /// Remove `member` from sorted set `space`, returning whether it existed
    async fn zrem(&self, space: &str, member: &str) -> KvResult<bool>;

    /// Score of `member` in sorted set `space`
    async fn zscore(&self, space: &str, member: &str) -> KvResult<Option<f64>>;

    /// Every member of sorted set `space`, lowest score first
    async fn zrange_all(&self, space: &str) -> KvResult<Vec<String>>;

    /// Set plain key `key`
    async fn set(&self, key: &str, value: &str) -> KvResult<()>;

    /// Delete plain key `key`, returning whether it existed
    async fn del(&self, key: &str) -> KvResult<bool>;

    /// Start an empty batch for [`KvStore::execute`]
    fn pipeline(&self) -> Batch {
        Batch::new()
    }

    /// Apply every write of `batch` atomically
    async fn execute(&self, batch: Batch) -> KvResult<()>;

    /// Enable keyspace notifications for all keys and commands
    ///
    /// Idempotent. Callers treat failure as non-fatal since an operator may
    /// enable notifications out of band.
    async fn configure_notifications(&self) -> KvResult<()>;

    /// Subscribe to keyspace notifications whose channel matches `pattern`
    async fn subscribe_key_events(&self, pattern: &str) -> KvResult<KeyEventStream>;

    /// Check connectivity
    async fn ping(&self) -> KvResult<()>;

    /// Logical database index, part of every keyspace channel name
    fn db(&self) -> i64;
}

//! Redis-based implementation of `KvStore`

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::{
    error::{KvError, KvResult},
    store::{Batch, BatchOp, KeyEvent, KeyEventStream, KeyOp, KvStore},
};

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis host name
    pub host: String,
    /// Redis port
    pub port: u16,
    /// Logical database index
    pub db: i64,
    /// Optional password
    pub password: Option<String>,
    /// Maximum number of connections in the pool
    pub pool_size: usize,
    /// Command timeout in seconds
    pub command_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            pool_size: 10,
            command_timeout_secs: 3,
        }
    }
}

impl RedisConfig {
    /// Create a new Redis configuration
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the database index
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Set the password
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    /// Set the pool size
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set command timeout
    pub fn with_command_timeout(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    /// Connection URL in `redis://[:password@]host:port/db` form
    pub fn connection_url(&self) -> KvResult<String> {
        let mut url = url::Url::parse(&format!("redis://{}:{}", self.host, self.port))
            .map_err(|e| KvError::InvalidConfig(format!("invalid redis address: {e}")))?;
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| KvError::InvalidConfig("cannot embed redis password".to_string()))?;
        }
        url.set_path(&format!("/{}", self.db));
        Ok(url.to_string())
    }
}

/// Redis-backed substrate
///
/// Commands go through a deadpool connection pool. Every keyspace
/// subscription opens its own pub/sub connection.
pub struct RedisStore {
    pool: deadpool_redis::Pool,
    client: redis::Client,
    config: RedisConfig,
}

impl RedisStore {
    /// Connect with default configuration against `host:port`
    pub async fn new(host: impl Into<String>, port: u16) -> KvResult<Self> {
        Self::with_config(RedisConfig::new(host, port)).await
    }

    /// Connect with custom configuration and verify the server answers PING
    pub async fn with_config(config: RedisConfig) -> KvResult<Self> {
        let url = config.connection_url()?;

        let mut pool_config = deadpool_redis::Config::from_url(url.as_str());
        pool_config.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));

        let pool = pool_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| KvError::ConnectionFailed(e.to_string()))?;

        let client = redis::Client::open(url.as_str())
            .map_err(|e| KvError::ConnectionFailed(e.to_string()))?;

        let store = Self {
            pool,
            client,
            config,
        };
        store.ping().await?;

        debug!(
            host = %store.config.host,
            port = store.config.port,
            db = store.config.db,
            "Redis substrate connected"
        );
        Ok(store)
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Get a connection from the pool
    async fn get_connection(&self) -> KvResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| KvError::ConnectionFailed(e.to_string()))
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs)
    }

    /// Run a command future under the configured command timeout
    async fn timed<T, F>(&self, fut: F) -> KvResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let limit = self.command_timeout();
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| KvError::Timeout(limit))?
            .map_err(KvError::from)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn hset(&self, space: &str, field: &str, payload: &str) -> KvResult<()> {
        let mut conn = self.get_connection().await?;
        self.timed(conn.hset::<_, _, _, ()>(space, field, payload))
            .await
    }

    async fn hget(&self, space: &str, field: &str) -> KvResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        self.timed(conn.hget::<_, _, Option<String>>(space, field))
            .await
    }

    async fn hdel(&self, space: &str, field: &str) -> KvResult<bool> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = self.timed(conn.hdel(space, field)).await?;
        Ok(removed > 0)
    }

    async fn hkeys(&self, space: &str) -> KvResult<Vec<String>> {
        let mut conn = self.get_connection().await?;
        self.timed(conn.hkeys::<_, Vec<String>>(space)).await
    }

    async fn zadd(&self, space: &str, member: &str, score: f64) -> KvResult<()> {
        let mut conn = self.get_connection().await?;
        self.timed(conn.zadd::<_, _, _, ()>(space, member, score))
            .await
    }

    async fn zrem(&self, space: &str, member: &str) -> KvResult<bool> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = self.timed(conn.zrem(space, member)).await?;
        Ok(removed > 0)
    }

    async fn zscore(&self, space: &str, member: &str) -> KvResult<Option<f64>> {
        let mut conn = self.get_connection().await?;
        self.timed(conn.zscore::<_, _, Option<f64>>(space, member))
            .await
    }

    async fn zrange_all(&self, space: &str) -> KvResult<Vec<String>> {
        let mut conn = self.get_connection().await?;
        self.timed(conn.zrange::<_, Vec<String>>(space, 0, -1))
            .await
    }

    async fn set(&self, key: &str, value: &str) -> KvResult<()> {
        let mut conn = self.get_connection().await?;
        self.timed(conn.set::<_, _, ()>(key, value)).await
    }

    async fn del(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = self.timed(conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn execute(&self, batch: Batch) -> KvResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.ops() {
            match op {
                BatchOp::HSet {
                    space,
                    field,
                    payload,
                } => pipe.hset(space, field, payload).ignore(),
                BatchOp::HDel { space, field } => pipe.hdel(space, field).ignore(),
                BatchOp::ZAdd {
                    space,
                    member,
                    score,
                } => pipe.zadd(space, member, *score).ignore(),
                BatchOp::ZRem { space, member } => pipe.zrem(space, member).ignore(),
                BatchOp::Set { key, value } => pipe.set(key, value).ignore(),
                BatchOp::Del { key } => pipe.del(key).ignore(),
            };
        }

        let mut conn = self.get_connection().await?;
        self.timed(pipe.query_async::<()>(&mut *conn)).await?;
        debug!(ops = batch.len(), "Executed atomic batch");
        Ok(())
    }

    async fn configure_notifications(&self) -> KvResult<()> {
        let mut conn = self.get_connection().await?;
        let mut cmd = redis::cmd("CONFIG");
        cmd.arg("SET").arg("notify-keyspace-events").arg("KEA");
        self.timed(cmd.query_async::<()>(&mut *conn)).await?;
        debug!("Keyspace notifications enabled (KEA)");
        Ok(())
    }

    async fn subscribe_key_events(&self, pattern: &str) -> KvResult<KeyEventStream> {
        // Subscriptions need a dedicated connection
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| KvError::ConnectionFailed(e.to_string()))?;

        pubsub
            .psubscribe(pattern)
            .await
            .map_err(|e| KvError::SubscribeFailed(e.to_string()))?;

        debug!(pattern = %pattern, "Subscribed to keyspace notifications");

        let stream = pubsub.into_on_message().map(|msg| {
            let channel = msg.get_channel_name().to_string();
            let payload: String = msg.get_payload().map_err(|e| {
                error!(channel = %channel, "Failed to read notification payload: {}", e);
                KvError::Decode(e.to_string())
            })?;
            Ok(KeyEvent::new(channel, KeyOp::parse(&payload)))
        });

        Ok(Box::pin(stream))
    }

    async fn ping(&self) -> KvResult<()> {
        let mut conn = self.get_connection().await?;
        let reply = self
            .timed(redis::cmd("PING").query_async::<String>(&mut *conn))
            .await
            .map_err(|e| KvError::ConnectionFailed(format!("PING failed: {}", e)))?;
        if reply != "PONG" {
            warn!(reply = %reply, "Unexpected PING reply");
        }
        Ok(())
    }

    fn db(&self) -> i64 {
        self.config.db
    }
}

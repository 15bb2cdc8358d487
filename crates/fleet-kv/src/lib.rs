//! # Fleet KV
//!
//! Key/value substrate used by the agent registry: hash maps, sorted sets,
//! atomic write batches and keyspace-event subscriptions.
//!
//! Two backends implement [`KvStore`]:
//!
//! - [`RedisStore`] (feature `redis`): deadpool connection pool for commands,
//!   a dedicated pub/sub connection per keyspace subscription.
//! - [`MemoryStore`]: in-process store with the same notification semantics,
//!   used by tests and single-process deployments.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleet_kv::{KeyspaceChannel, KvStore, MemoryStore};
//! use futures::StreamExt;
//!
//! # async fn demo() -> Result<(), fleet_kv::KvError> {
//! let store = MemoryStore::new();
//! store.configure_notifications().await?;
//!
//! let channels = KeyspaceChannel::new(store.db(), "expert_agents");
//! let mut events = store.subscribe_key_events(&channels.pattern()).await?;
//!
//! store.set("expert_agents:http://a:1", "1").await?;
//! if let Some(Ok(event)) = events.next().await {
//!     assert_eq!(channels.parse(&event.channel), Some("http://a:1"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod keyspace;
pub mod memory;
pub mod store;

#[cfg(feature = "redis")]
pub mod redis;

pub use error::{KvError, KvResult};
pub use keyspace::KeyspaceChannel;
pub use memory::MemoryStore;
pub use store::{Batch, BatchOp, KeyEvent, KeyEventStream, KeyOp, KvStore};

#[cfg(feature = "redis")]
pub use redis::{RedisConfig, RedisStore};

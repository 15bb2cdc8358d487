//! # Fleet Registry
//!
//! The live set of expert agents, kept in a Redis-style substrate that
//! workers write to directly:
//!
//! - `expert_agents`: hash of `url -> descriptor JSON`
//! - `agent_heartbeats`: sorted set of `url -> last heartbeat (unix seconds)`
//! - `expert_agents:<url>`: marker key whose `set`/`del` keyspace
//!   notifications announce arrivals and departures
//!
//! [`Registry`] follows those notifications into an in-memory replica and
//! fans [`ChangeEvent`]s out to handlers; its reaper evicts agents whose
//! heartbeat is older than 30 s. [`SemanticMirror`] keeps a semantic index
//! collection aligned with the live set. [`AgentPublisher`] and
//! [`HeartbeatService`] are the worker side of the contract.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleet_kv::MemoryStore;
//! use fleet_registry::{ChangeEvent, ChangeKind, Dispatch, HandlerError, Registry, RegistryConfig};
//!
//! # async fn demo() -> Result<(), fleet_registry::RegistryError> {
//! let store = Arc::new(MemoryStore::new());
//! let registry = Registry::new(store, RegistryConfig::default()).bootstrap().await?;
//!
//! let watch = registry.watch(
//!     |event: &ChangeEvent| -> Result<Dispatch, HandlerError> {
//!         println!("{} {}", event.kind.as_str(), event.url);
//!         Ok(Dispatch::Done)
//!     },
//!     &ChangeKind::ALL,
//! );
//! let reaper = registry.start_reaper();
//!
//! // ...
//! watch.stop().await;
//! reaper.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod mirror;
pub mod publisher;
pub mod registry;
pub mod replica;

pub use config::{HEARTBEAT_KEY, HeartbeatConfig, REGISTRY_KEY, RegistryConfig, marker_key};
pub use error::{HandlerError, RegistryError, RegistryResult};
pub use event::{ChangeEvent, ChangeHandler, ChangeKind, Dispatch};
pub use mirror::{
    AGENT_FIELD, AGENT_URL_FIELD, DEFAULT_QUEUE_CAPACITY, MirrorConfig, MirrorHandle, SemanticMirror,
};
pub use publisher::{AgentPublisher, HeartbeatService};
pub use registry::{ReaperHandle, Registry, WatchHandle, WorkerHandle, decode_descriptor, unix_now};
pub use replica::Replica;

//! # Fleet
//!
//! A dynamic registry of expert agents and a router in front of them.
//!
//! - [`kv`]: key/value substrate with keyspace notifications (Redis or in-memory)
//! - [`vector`]: semantic index the live agents are mirrored into
//! - [`a2a`]: agent cards and the streaming agent-to-agent protocol
//! - [`registry`]: live set, heartbeats, reaper, change fan-out and the semantic mirror
//! - [`routing`]: candidate search, LLM planning and dispatch to the chosen agent
//! - [`observability`]: logging, span export and metrics
//! - [`http`]: registry API, environment configuration and shutdown handling
//!
//! ```rust,no_run
//! use fleet::kv::MemoryStore;
//! use fleet::registry::{AgentPublisher, Registry, RegistryConfig};
//! use fleet::a2a::AgentCard;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), fleet::registry::RegistryError> {
//! let store = Arc::new(MemoryStore::new());
//! AgentPublisher::new(store.clone())
//!     .register(&AgentCard::new("coder", "http://coder:9000/"))
//!     .await?;
//!
//! let registry = Registry::new(store, RegistryConfig::default()).bootstrap().await?;
//! assert_eq!(registry.list_live().len(), 1);
//! # Ok(())
//! # }
//! ```

pub use fleet_a2a as a2a;
pub use fleet_http as http;
pub use fleet_kv as kv;
pub use fleet_observability as observability;
pub use fleet_registry as registry;
pub use fleet_routing as routing;
pub use fleet_vector as vector;

pub use fleet_a2a::AgentCard;
pub use fleet_registry::{ChangeEvent, ChangeKind, Registry, SemanticMirror};
pub use fleet_routing::RoutingExecutor;

//! # fleet-http
//!
//! The registry's HTTP surface plus what every fleet binary shares:
//! environment configuration and graceful shutdown.
//!
//! ```rust,no_run
//! use fleet_http::{ApiState, ServiceConfigBuilder, router, serve, shutdown_signal};
//! use fleet_kv::MemoryStore;
//! use fleet_registry::Registry;
//! use fleet_vector::MemoryIndex;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfigBuilder::from_env()?.build()?;
//! let registry = Registry::new(Arc::new(MemoryStore::new()), config.registry.clone())
//!     .bootstrap()
//!     .await?;
//! let state = ApiState::new(registry, Arc::new(MemoryIndex::new()), &config.mirror.collection);
//! serve(router(state, &config.http), &config.http, shutdown_signal()).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod shutdown;

pub use api::{ApiState, SearchRequest, router};
pub use config::{ConfigError, HttpServiceConfig, ServiceConfig, ServiceConfigBuilder};
pub use error::ApiError;
pub use shutdown::shutdown_signal;

use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

/// Bind `http.address()` and serve `router` until `shutdown` completes
pub async fn serve<F>(router: Router, http: &HttpServiceConfig, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(http.address()).await?;
    info!(address = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

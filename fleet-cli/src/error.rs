use std::path::PathBuf;

/// Fatal startup and serving failures; each one exits with status 1
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] fleet_http::ConfigError),

    #[error("observability setup failed: {0}")]
    Observability(#[from] fleet_observability::ObservabilityError),

    #[error("metrics setup failed: {0}")]
    Metrics(#[from] fleet_observability::MetricsError),

    #[error("cannot read agent card {path}: {source}")]
    CardRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid agent card {path}: {message}")]
    CardInvalid { path: PathBuf, message: String },

    #[error("semantic index setup failed: {0}")]
    Index(#[from] fleet_vector::IndexError),

    #[error("registry startup failed: {0}")]
    Registry(#[from] fleet_registry::RegistryError),

    #[error("substrate connection failed: {0}")]
    Kv(#[from] fleet_kv::KvError),

    #[error("routing agent setup failed: {0}")]
    Routing(#[from] fleet_routing::RoutingError),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

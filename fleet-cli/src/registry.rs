//! `fleet registry`: the registry service and its HTTP API

use clap::Args;
use fleet_http::{ApiState, ServiceConfigBuilder, router, serve, shutdown_signal};
use fleet_kv::{KvStore, RedisStore};
use fleet_observability::FleetMetrics;
use fleet_registry::{Registry, SemanticMirror};
use fleet_vector::{DataServicesIndex, SemanticIndex};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::CliError;

#[derive(Args, Debug, Default)]
pub struct RegistryArgs {
    /// Redis host
    #[arg(long)]
    pub redis_host: Option<String>,
    /// Redis port
    #[arg(long)]
    pub redis_port: Option<u16>,
    /// Redis database number
    #[arg(long)]
    pub redis_db: Option<i64>,
    /// Redis password
    #[arg(long)]
    pub redis_password: Option<String>,
    /// Address the API binds to
    #[arg(long)]
    pub api_host: Option<String>,
    /// Port the API listens on
    #[arg(long)]
    pub api_port: Option<u16>,
    /// Base url of the semantic index service
    #[arg(long)]
    pub data_services: Option<String>,
    /// Collection the mirror maintains
    #[arg(long)]
    pub collection: Option<String>,
}

impl RegistryArgs {
    /// Command line values take precedence over the environment
    pub fn apply(&self, mut builder: ServiceConfigBuilder) -> ServiceConfigBuilder {
        if let Some(host) = &self.redis_host {
            builder = builder.redis_host(host);
        }
        if let Some(port) = self.redis_port {
            builder = builder.redis_port(port);
        }
        if let Some(db) = self.redis_db {
            builder = builder.redis_db(db);
        }
        if self.redis_password.is_some() {
            builder = builder.redis_password(self.redis_password.clone());
        }
        if let Some(host) = &self.api_host {
            builder = builder.api_host(host);
        }
        if let Some(port) = self.api_port {
            builder = builder.api_port(port);
        }
        if let Some(url) = &self.data_services {
            builder = builder.data_services(url);
        }
        if let Some(collection) = &self.collection {
            builder = builder.collection(collection);
        }
        builder
    }
}

pub async fn run(args: RegistryArgs) -> Result<(), CliError> {
    let config = args.apply(ServiceConfigBuilder::from_env()?).build()?;
    let metrics = FleetMetrics::new()?;

    let index: Arc<dyn SemanticIndex> = Arc::new(DataServicesIndex::new(config.index.clone())?);
    let mirror = Arc::new(
        SemanticMirror::new(Arc::clone(&index), config.mirror.clone()).with_metrics(metrics.clone()),
    );
    if let Err(e) = mirror.ensure_collection().await {
        error!(collection = %config.mirror.collection, error = %e, "Failed to create mirror collection");
        return Err(e.into());
    }

    let store: Arc<dyn KvStore> = Arc::new(RedisStore::with_config(config.redis.clone()).await?);
    let registry = Registry::new(store, config.registry.clone())
        .with_metrics(metrics.clone())
        .bootstrap()
        .await?;

    let reaper = registry.start_reaper();
    let mirror = mirror.start(&registry);

    let state = ApiState::new(Arc::clone(&registry), index, &config.mirror.collection)
        .with_metrics(metrics);
    info!(
        redis = %format!("{}:{}", config.redis.host, config.redis.port),
        collection = %config.mirror.collection,
        agents = registry.len(),
        "Registry service starting"
    );
    let served = serve(router(state, &config.http), &config.http, shutdown_signal()).await;

    mirror.stop().await;
    reaper.stop().await;
    info!("Registry service stopped");
    served.map_err(CliError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_environment() {
        let args = RegistryArgs {
            redis_host: Some("cli-redis".into()),
            api_port: Some(9100),
            collection: Some("cards_v2".into()),
            ..Default::default()
        };
        let config = args
            .apply(
                ServiceConfigBuilder::from_lookup(|key| {
                    (key == "REDIS_HOST").then(|| "env-redis".to_string())
                })
                .unwrap(),
            )
            .build()
            .unwrap();

        assert_eq!(config.redis.host, "cli-redis");
        assert_eq!(config.http.port, 9100);
        assert_eq!(config.mirror.collection, "cards_v2");
    }
}

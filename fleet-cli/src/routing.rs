//! `fleet routing`: the routing agent served over A2A

use clap::Args;
use fleet_a2a::{A2aServer, AgentCard};
use fleet_http::{HttpServiceConfig, ServiceConfigBuilder, serve, shutdown_signal};
use fleet_observability::FleetMetrics;
use fleet_routing::RoutingExecutor;
use fleet_vector::DataServicesIndex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::CliError;

#[derive(Args, Debug)]
pub struct RoutingArgs {
    /// JSON file holding this agent's own card
    #[arg(long)]
    pub agent_card: PathBuf,
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
    /// Port to listen on
    #[arg(long, default_value_t = 10100)]
    pub port: u16,
}

/// Read and validate the card the routing agent advertises
pub fn load_card(path: &Path) -> Result<AgentCard, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::CardRead {
        path: path.to_path_buf(),
        source,
    })?;
    let invalid = |message: String| CliError::CardInvalid {
        path: path.to_path_buf(),
        message,
    };
    let card: AgentCard = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
    card.validate().map_err(|e| invalid(e.to_string()))?;
    Ok(card)
}

pub async fn run(args: RoutingArgs) -> Result<(), CliError> {
    let card = load_card(&args.agent_card)?;
    let config = ServiceConfigBuilder::from_env()?.build()?;

    let index = Arc::new(DataServicesIndex::new(config.index.clone())?);
    let executor = RoutingExecutor::from_config(index, &config.llm, &config.routing)?
        .with_metrics(FleetMetrics::new()?);

    let http = HttpServiceConfig {
        host: args.host,
        port: args.port,
        enable_cors: false,
    };
    info!(
        agent = %card.name,
        collection = %config.routing.collection,
        model = %config.llm.model,
        "Routing agent starting"
    );
    let router = A2aServer::new(card, executor)
        .router()
        .layer(TraceLayer::new_for_http());
    serve(router, &http, shutdown_signal()).await?;
    info!("Routing agent stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn card_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loads_a_valid_card() {
        let file = card_file(
            r#"{"name":"Router","description":"routes questions","url":"http://router:10100/","version":"1.0.0"}"#,
        );
        let card = load_card(file.path()).unwrap();
        assert_eq!(card.name, "Router");
        assert_eq!(card.url, "http://router:10100/");
    }

    #[test]
    fn test_missing_card_is_fatal() {
        let err = load_card(Path::new("/nonexistent/router-card.json")).unwrap_err();
        assert!(matches!(err, CliError::CardRead { .. }));
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"{"name":"","url":"http://router:10100/"}"#)]
    fn test_invalid_card_is_fatal(#[case] contents: &str) {
        let file = card_file(contents);
        assert!(matches!(
            load_card(file.path()).unwrap_err(),
            CliError::CardInvalid { .. }
        ));
    }
}

use clap::{Parser, Subcommand};
use fleet_observability::{LogFormat, ObservabilityConfig, init_tracing};
use std::process::ExitCode;

mod error;
mod registry;
mod routing;

use error::CliError;
use registry::RegistryArgs;
use routing::RoutingArgs;

#[derive(Parser, Debug)]
#[command(name = "fleet", version)]
#[command(about = "Fleet - dynamic agent registry and routing agent")]
struct Cli {
    /// Log line format (json, text)
    #[arg(long, global = true, default_value = "json", value_parser = parse_log_format)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the agent registry, its semantic mirror and the registry API
    Registry(RegistryArgs),
    /// Serve the routing agent
    Routing(RoutingArgs),
}

fn parse_log_format(raw: &str) -> Result<LogFormat, String> {
    raw.parse().map_err(|e: fleet_observability::ObservabilityError| e.to_string())
}

impl Commands {
    fn service_name(&self) -> &'static str {
        match self {
            Commands::Registry(_) => "fleet-registry",
            Commands::Routing(_) => "fleet-routing",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let observability =
        ObservabilityConfig::new(cli.command.service_name()).with_log_format(cli.log_format);
    let telemetry = match init_tracing(&observability) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result: Result<(), CliError> = match cli.command {
        Commands::Registry(args) => registry::run(args).await,
        Commands::Routing(args) => routing::run(args).await,
    };

    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    };
    telemetry.shutdown();
    code
}

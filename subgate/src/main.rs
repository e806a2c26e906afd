mod config;
mod records;
mod telemetry;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use subscription::RecordStore;

#[derive(Parser)]
#[command(name = "subgate", about = "Clash subscription converter and cache")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, short, default_value = "subgate.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the gateway and admin listeners
    Serve,
    /// Manage subscription records
    #[command(subcommand)]
    Record(records::RecordCommand),
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("serve requires a gateway section in the config")]
    MissingGateway,
    #[error(transparent)]
    Telemetry(#[from] telemetry::TelemetryError),
    #[error(transparent)]
    Gateway(#[from] gateway::GatewayError),
    #[error(transparent)]
    Record(#[from] records::CommandError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    let logging = config.logging.clone().unwrap_or_default();
    let _sentry = telemetry::init_logging(&logging);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "subgate failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: CliCommand, config: config::Config) -> Result<(), CliError> {
    let store = store::from_config(&config.store);

    match command {
        CliCommand::Serve => {
            let gateway_config = config.gateway.ok_or(CliError::MissingGateway)?;
            if let Some(metrics) = &config.metrics {
                telemetry::init_metrics(metrics)?;
            }

            tracing::info!(
                listener = %format!("{}:{}", gateway_config.listener.host, gateway_config.listener.port),
                admin = %format!("{}:{}", gateway_config.admin_listener.host, gateway_config.admin_listener.port),
                "starting gateway"
            );
            gateway::run(gateway_config, store).await?;
        }
        CliCommand::Record(command) => {
            let records = RecordStore::new(store);
            records::execute(command, &records, &mut std::io::stdout()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record_add() {
        let cli = Cli::try_parse_from([
            "subgate",
            "--config",
            "/etc/subgate.yaml",
            "record",
            "add",
            "--label",
            "Airport",
            "--url",
            "https://upstream.example/sub",
            "--region",
            "hk,us",
            "--max-billing-rate",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/subgate.yaml"));
        let CliCommand::Record(records::RecordCommand::Add { label, filter, .. }) = cli.command else {
            panic!("expected record add");
        };
        assert_eq!(label, "Airport");
        assert_eq!(filter.regions, ["hk", "us"]);
        assert_eq!(filter.max_billing_rate, Some(2.0));
    }

    #[tokio::test]
    async fn test_serve_requires_gateway_section() {
        let config: config::Config = serde_yaml::from_str("store: {type: memory}").unwrap();
        let err = run(CliCommand::Serve, config).await.unwrap_err();
        assert!(matches!(err, CliError::MissingGateway));
    }
}

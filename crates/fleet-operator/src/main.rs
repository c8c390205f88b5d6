//! Fleet Operator - NodePool reconciliation for hosted clusters

mod cli;
mod crds;
mod render;
mod runner;

use clap::Parser;

use fleet_common::telemetry::{init_telemetry, TelemetryConfig};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Crd) = cli.command {
        print!("{}", crds::crds_yaml()?);
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        service_name: "fleet-operator".to_string(),
        format: cli.log_format,
    })?;

    match cli.command {
        Some(Command::Render(args)) => render::run_render(&args),
        Some(Command::Controller) | Some(Command::Crd) | None => {
            runner::run_controller(&cli.controller).await
        }
    }
}

//! kindling entry point.
//!
//! Logs go to stderr; reports and outputs go to stdout.

mod cli;

use anyhow::Context as _;
use clap::Parser;
use cli::{Cli, Command};
use kindling_core::{CheckStatus, Environment, Settings};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("kindling=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref(), cli.overrides())
        .context("failed to resolve settings")?;
    tracing::info!(?settings, "Configuration loaded");

    let env = Environment::for_host(settings, cli.workdir.as_deref())
        .context("failed to prepare environment")?;

    match cli.command {
        Command::Up { json } => {
            let report = match env.up().await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(error = %e, "Provisioning failed");
                    return Ok(ExitCode::FAILURE);
                }
            };
            if let Some(health) = &report.verification {
                println!("{health}");
            }
            println!("{}", env.summary_banner());
            if json {
                println!("{}", serde_json::to_string_pretty(&report.outputs)?);
            } else {
                println!("clusterName: {}", report.outputs.cluster_name);
                println!("kubeconfigPath: {}", report.outputs.kubeconfig_path.display());
            }
        }
        Command::Down => env.down().await,
        Command::Verify => {
            let health = env.verify().await;
            println!("{health}");
            if health.count(CheckStatus::Fail) > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Plan => {
            for (i, wave) in env.plan().iter().enumerate() {
                println!("{}. {}", i + 1, wave.join(", "));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

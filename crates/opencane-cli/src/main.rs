//! CLI entry point — the composition root's caller.
//!
//! Loads `.env`/environment configuration, builds the single
//! [`opencane_bootstrap::RuntimeContext`], and serves the HTTP control
//! surface until the process is asked to shut down. Exit codes follow spec
//! §6.2: `0` normal, `1` config invalid, `2` strict-startup dependency
//! failure (database, or any other service `RuntimeContext::build` cannot
//! bring up).

use std::process::ExitCode;

use clap::Parser;
use opencane_cli::Cli;
use opencane_core::settings::RuntimeConfig;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid runtime configuration");
            return ExitCode::from(1);
        }
    };

    if cli.check_config {
        println!("configuration OK");
        return ExitCode::SUCCESS;
    }

    let context = match opencane_bootstrap::RuntimeContext::build(config).await {
        Ok(context) => context,
        Err(e) => {
            tracing::error!(error = %e, "strict-startup dependency check failed");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = opencane_axum::serve(context).await {
        tracing::error!(error = %e, "runtime exited with an error");
        return ExitCode::from(2);
    }

    ExitCode::SUCCESS
}

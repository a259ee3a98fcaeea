//! CLI entry point - the composition root.
//!
//! This is the only place that wires a concrete `InferenceWorker` into the
//! gateway; everything below it only knows the `InferenceWorker` trait.

use std::sync::Arc;

use asrg_cli::{Cli, Commands};
use asrg_cli::worker::SilentWorker;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Commands::Serve(args) = cli.command;

    let filter = match args.verbosity_filter() {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.into_config();
    let worker = Arc::new(SilentWorker);
    asrg_runtime::run(config, worker).await?;
    Ok(())
}

//! # Composable Controller
//!
//! Kubernetes controller that turns `Composable` resources into concrete objects.
//!
//! A Composable embeds the manifest of another object in `spec.template`. Any
//! value in that manifest may be a `getValueFrom` reference to a field of
//! another object in the cluster; the controller resolves every reference,
//! creates (or updates) the resulting object and keeps it in sync.

use anyhow::{Context, Result};
use clap::Parser;
use composable_controller::runtime::{initialize, run_watch_loop, RuntimeOptions, ShutdownSignal};
use std::path::PathBuf;
use tracing::info;

/// Composable controller manager
#[derive(Debug, Parser)]
#[command(name = "composable-controller", version, about, long_about = None)]
struct Cli {
    /// Path to a kubeconfig file (in-cluster or default configuration when absent)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Port of the metrics and probe server (overrides METRICS_PORT)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let shutdown = ShutdownSignal::new().context("Failed to install signal handlers")?;

    let init = initialize(RuntimeOptions {
        kubeconfig: cli.kubeconfig,
        metrics_port: cli.metrics_port,
    })
    .await?;

    run_watch_loop(
        init.composables,
        init.reconciler,
        init.watches,
        init.server_state,
        init.controller_config,
        shutdown,
    )
    .await?;

    info!("Composable controller exited");
    Ok(())
}

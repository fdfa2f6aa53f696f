//! Vigil cluster node
//!
//! Runs one endpoint of a monitoring cluster: restores runtime state,
//! replicates changes along the zone tree and periodically persists state.
//!
//! Usage:
//!   vigil-node --config /etc/vigil/vigil.toml
//!
//! `RUST_LOG` overrides the log level chosen by `--verbose`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vigil_node::config::NodeConfig;
use vigil_node::Node;

#[derive(Parser, Debug)]
#[command(name = "vigil-node")]
#[command(about = "Vigil cluster node")]
struct Args {
    /// Path to the node configuration file
    #[arg(short, long, default_value = "vigil.toml")]
    config: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Vigil node starting...");
    let config = NodeConfig::load(&args.config)?;
    let mut node = Node::new(config)?;
    let stats = node.start().await?;

    println!("\n========================================");
    println!("  Vigil Node Running");
    println!("========================================");
    println!("  Endpoint:  {}", node.config().node.endpoint);
    println!("  State:     {}", node.config().state_path().display());
    println!("  Objects:   {}", node.registry().object_count());
    println!("  Restored:  {} records", stats.restored);
    println!("========================================\n");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down...");

    let dumped = node.shutdown().await?;
    info!("Wrote {} objects to the state file", dumped.written);
    Ok(())
}

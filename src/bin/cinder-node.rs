#![forbid(unsafe_code)]
//! CinderChain node: P2P listener plus HTTP API

use cinderchain::config::{load_config, load_config_from};
use cinderchain::node::Node;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long)]
    config: Option<String>,
    /// Overrides network.p2p_port
    #[arg(long)]
    p2p_port: Option<u16>,
    /// Overrides network.api_port
    #[arg(long)]
    api_port: Option<u16>,
    /// Peer WebSocket URL to join; may be repeated
    #[arg(long = "peer")]
    peers: Vec<String>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(port) = cli.p2p_port {
        config.network.p2p_port = port;
    }
    if let Some(port) = cli.api_port {
        config.network.api_port = port;
    }
    config.network.bootstrap_peers.extend(cli.peers);

    tracing::info!("CinderChain node v{}", env!("CARGO_PKG_VERSION"));
    let node = Arc::new(Node::init(config)?);
    node.start().await?;
    Ok(())
}

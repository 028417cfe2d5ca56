#![forbid(unsafe_code)]
//! CareChain ledger node

use carechain::config::load_config;
use carechain::node::{init_tracing, shutdown_signal, Node};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "carechain-node", version, about = "Run a CareChain ledger node")]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Configuration file (defaults to ./carechain.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not start the background miner
    #[arg(long)]
    no_miner: bool,

    /// Seconds between background mining attempts
    #[arg(long)]
    mine_interval: Option<u64>,

    /// Peer to register at start-up (repeatable)
    #[arg(long = "peer")]
    peers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(host) = args.host {
        config.network.host = host;
    }
    if args.no_miner {
        config.miner.enabled = false;
    }
    if let Some(interval) = args.mine_interval {
        config.miner.interval_secs = interval;
    }
    config.network.bootstrap_peers.extend(args.peers);

    let node = Node::new(config)?;
    node.run(shutdown_signal()).await?;
    Ok(())
}

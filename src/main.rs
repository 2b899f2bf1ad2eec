//! Minimal process entry point: load configuration, bootstrap the node,
//! and run it until interrupted. Argument parsing intentionally stays
//! thin — everything else lives in `numi_core`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use numi_core::chain_store::Genesis;
use numi_core::config::NodeConfig;
use numi_core::node::{InMemorySigner, Node};
use numi_core::primitives::Address;
use numi_core::Result;

#[derive(Parser)]
#[command(name = "numi-core")]
#[command(about = "A minimal proof-of-work blockchain node")]
struct Cli {
    /// Directory holding genesis.json and the chain log.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// HTTP listen port, overriding the config preset.
    #[arg(long)]
    listen_port: Option<u16>,

    /// IP address this node advertises to peers.
    #[arg(long, default_value = "127.0.0.1")]
    listen_ip: String,

    /// Comma-separated `ip:port` bootstrap peers, overriding the config preset.
    #[arg(long)]
    bootstrap: Option<String>,

    /// Named preset: production, development, or testnet.
    #[arg(long, default_value = "development")]
    preset: String,

    /// TOML config file to load instead of a preset.
    #[arg(long)]
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config_file {
        Some(path) => NodeConfig::load_from_file(path)?,
        None => match cli.preset.as_str() {
            "production" => NodeConfig::production(),
            "testnet" => NodeConfig::testnet(),
            _ => NodeConfig::development(),
        },
    };
    config.apply_env_overrides();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(port) = cli.listen_port {
        config.listen_port = port;
    }
    if let Some(bootstrap) = cli.bootstrap {
        config.bootstrap_peers = bootstrap.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    }
    config.validate().map_err(numi_core::NodeError::InvalidArgument)?;

    let secp = secp256k1::Secp256k1::new();
    let (secret_key, public_key) = secp.generate_keypair(&mut rand::thread_rng());
    let miner_account = Address::from_public_key(&public_key);
    let mut signer = InMemorySigner::new();
    signer.add_account("", secret_key);
    log::info!("mining to ephemeral account {}", miner_account.hex());

    let default_genesis = Genesis {
        genesis_time: "2024-01-01T00:00:00Z".to_string(),
        chain_id: "numi-dev".to_string(),
        symbol: "NUMI".to_string(),
        balances: serde_json::Map::new(),
    };

    let node = Node::bootstrap(config, cli.listen_ip, miner_account, Arc::new(signer), default_genesis)?;

    let cancel = node.cancellation_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("shutdown signal received");
        cancel.cancel();
    });

    node.run().await
}

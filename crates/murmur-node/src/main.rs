// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `murmurd` — one node of a murmur cluster.

use anyhow::Result;
use clap::Parser;
use murmur_node::{load_aae_config, Node, NodeSettings};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "murmurd", about = "murmur document store node", version)]
struct Args {
    /// Cluster config file (JSON: this node's AAE endpoints plus neighbors).
    #[arg(long, env = "MURMURD_CONFIG")]
    config: PathBuf,

    /// Client endpoint to bind.
    #[arg(long, default_value = "0.0.0.0:50000")]
    listen: String,

    /// Data root directory; collections live in subdirectories.
    #[arg(long, default_value = "murmur_data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let aae = load_aae_config(&args.config).await?;

    let node = Node::start(NodeSettings {
        data_dir: args.data_dir,
        listen: args.listen,
        aae,
    })
    .await?;
    info!(client = %node.client_addr(), "murmurd serving; ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    node.shutdown().await;
    Ok(())
}

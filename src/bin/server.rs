use std::path::PathBuf;

use clap::Parser;
use graphserve::{server, GraphConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "graphserve-server", about = "Serve one shard of a sampled graph")]
struct Cli {
    /// Path to the graph config (JSON)
    #[arg(long)]
    config: PathBuf,
    /// Overrides `shard_id` from the config file
    #[arg(long)]
    shard_id: Option<usize>,
    /// Overrides `thread_num` from the config file
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = GraphConfig::from_json_file(&cli.config)?;
    if let Some(shard_id) = cli.shard_id {
        config.shard_id = shard_id;
    }
    if let Some(threads) = cli.threads {
        config.thread_num = threads;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(config))
}

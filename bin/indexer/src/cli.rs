//! Contains the indexer CLI.

use crate::flags::{RpcArgs, ShardEndpoint, SyncArgs};
use anyhow::{Context, Result, bail};
use clap::Parser;
use shardex_cli::{LogArgs, MetricsArgs, cli_styles};
use shardex_core::{Metrics, SyncOrchestrator};
use shardex_storage::SqliteStore;
use shardex_types::ShardNumber;
use std::{collections::HashSet, path::PathBuf, sync::Arc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// File name of the index database inside the data directory.
const DB_FILE_NAME: &str = "index.db";

/// Mirrors the blocks, transactions, accounts and mempools of a sharded chain into a SQL
/// database.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, styles = cli_styles(), long_about = None)]
pub(crate) struct Cli {
    /// Logging arguments.
    #[command(flatten)]
    pub(crate) log: LogArgs,
    /// Prometheus exporter arguments.
    #[command(flatten)]
    pub(crate) metrics: MetricsArgs,
    /// Shard to index and its node, as `<shard>=<url>`. Repeat the flag for every shard.
    #[arg(
        long = "shard",
        env = "SHARDEX_SHARDS",
        value_delimiter = ',',
        required = true,
        value_name = "SHARD=URL"
    )]
    pub(crate) shards: Vec<ShardEndpoint>,
    /// Directory holding the index database.
    #[arg(long, env = "SHARDEX_DATADIR", default_value = "shardex-data")]
    pub(crate) datadir: PathBuf,
    /// Sync loop arguments.
    #[command(flatten)]
    pub(crate) sync: SyncArgs,
    /// Chain node client arguments.
    #[command(flatten)]
    pub(crate) rpc: RpcArgs,
}

impl Cli {
    /// Runs the indexer until a shutdown signal arrives.
    pub(crate) fn run(self) -> Result<()> {
        self.log.init_tracing()?;
        self.validate()?;

        let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
        rt.block_on(self.start())
    }

    /// Rejects configurations with two writers for one shard.
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for endpoint in &self.shards {
            if !seen.insert(endpoint.shard) {
                bail!("shard {} is configured more than once", endpoint.shard);
            }
        }
        Ok(())
    }

    /// Path of the index database.
    pub(crate) fn db_path(&self) -> PathBuf {
        self.datadir.join(DB_FILE_NAME)
    }

    async fn start(self) -> Result<()> {
        if let Some(addr) = self.metrics.init_metrics()? {
            info!(target: "shardex", %addr, "Metrics server started");
        }
        let shards: Vec<ShardNumber> = self.shards.iter().map(|endpoint| endpoint.shard).collect();
        Metrics::init(&shards);

        std::fs::create_dir_all(&self.datadir).with_context(|| {
            format!("Failed to create data directory '{}'", self.datadir.display())
        })?;
        let cancel = CancellationToken::new();
        let mut syncers = JoinSet::new();
        for endpoint in &self.shards {
            info!(target: "shardex", shard = endpoint.shard, url = %endpoint.url, "Indexing shard");
            // every syncer writes through its own connection
            let store = SqliteStore::open(self.db_path())
                .with_context(|| format!("Failed to open index for shard {}", endpoint.shard))?;
            let client = self.rpc.client(endpoint.url.clone());
            let syncer = SyncOrchestrator::new(
                self.sync.config(endpoint.shard),
                Arc::new(client),
                Arc::new(store),
            );
            syncers.spawn(syncer.run(cancel.child_token()));
        }

        tokio::select! {
            signal = shutdown_signal() => signal?,
            Some(result) = syncers.join_next() => {
                // syncers only return once cancelled
                if let Err(err) = result {
                    error!(target: "shardex", %err, "Shard syncer terminated");
                }
            }
        }

        info!(target: "shardex", "Shutting down, waiting for running cycles");
        cancel.cancel();
        while let Some(result) = syncers.join_next().await {
            if let Err(err) = result {
                error!(target: "shardex", %err, "Shard syncer terminated");
            }
        }
        info!(target: "shardex", "Shutdown complete");
        Ok(())
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!(target: "shardex", "Received SIGINT (Ctrl+C)");
            }
            _ = terminate.recv() => {
                info!(target: "shardex", "Received SIGTERM");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!(target: "shardex", "Received Ctrl+C");
        Ok(())
    }
}

//! Sync engine flags.

use clap::Args;
use shardex_core::{DEFAULT_FLUSH_THRESHOLD, DEFAULT_WORKER_COUNT, SyncConfig};
use shardex_types::ShardNumber;
use std::time::Duration;

/// Tuning of the per shard sync loop.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyncArgs {
    /// Seconds between the starts of two sync cycles.
    #[arg(long = "sync.interval", env = "SHARDEX_SYNC_INTERVAL", default_value_t = 10)]
    pub(crate) interval: u64,
    /// Concurrent chain requests per shard.
    #[arg(long = "sync.workers", env = "SHARDEX_SYNC_WORKERS", default_value_t = DEFAULT_WORKER_COUNT)]
    pub(crate) workers: usize,
    /// Number of touched accounts that triggers a refresh during catch-up.
    #[arg(
        long = "sync.flush-threshold",
        env = "SHARDEX_SYNC_FLUSH_THRESHOLD",
        default_value_t = DEFAULT_FLUSH_THRESHOLD
    )]
    pub(crate) flush_threshold: usize,
}

impl SyncArgs {
    /// Builds the sync configuration of `shard`.
    pub(crate) fn config(&self, shard: ShardNumber) -> SyncConfig {
        SyncConfig::new(shard)
            .with_interval(Duration::from_secs(self.interval))
            .with_worker_count(self.workers)
            .with_flush_threshold(self.flush_threshold)
    }
}

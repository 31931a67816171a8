//! Metrics of the sync engine.

use shardex_types::ShardNumber;
use std::time::Duration;

/// Container for the sync engine's metric names.
#[derive(Debug, Clone)]
pub struct Metrics;

impl Metrics {
    /// Counter of indexed blocks.
    pub const BLOCKS_INGESTED_TOTAL: &'static str = "shardex_sync_blocks_ingested_total";
    /// Counter of failed block ingestions.
    pub const INGEST_ERRORS_TOTAL: &'static str = "shardex_sync_ingest_errors_total";
    /// Counter of blocks rolled back by reorg resolution.
    pub const REORG_ROLLBACKS_TOTAL: &'static str = "shardex_sync_reorg_rollbacks_total";
    /// Counter of aborted sync cycles.
    pub const CYCLE_ERRORS_TOTAL: &'static str = "shardex_sync_cycle_errors_total";
    /// Histogram of sync cycle durations.
    pub const CYCLE_DURATION_SECONDS: &'static str = "shardex_sync_cycle_duration_seconds";
    /// Gauge of the next height to index.
    pub const LOCAL_HEIGHT: &'static str = "shardex_sync_local_height";
    /// Gauge of the chain node's head height.
    pub const REMOTE_HEIGHT: &'static str = "shardex_sync_remote_height";
    /// Gauge of the mirrored mempool size.
    pub const PENDING_TRANSACTIONS: &'static str = "shardex_sync_pending_transactions";
    /// Counter of refreshed account records.
    pub const ACCOUNTS_REFRESHED_TOTAL: &'static str = "shardex_sync_accounts_refreshed_total";

    /// Describes all metrics and initializes the counters of `shards` to zero.
    pub fn init(shards: &[ShardNumber]) {
        Self::describe();
        for shard in shards {
            Self::zero(*shard);
        }
    }

    fn describe() {
        metrics::describe_counter!(
            Self::BLOCKS_INGESTED_TOTAL,
            metrics::Unit::Count,
            "Total number of blocks indexed"
        );
        metrics::describe_counter!(
            Self::INGEST_ERRORS_TOTAL,
            metrics::Unit::Count,
            "Total number of failed block ingestions"
        );
        metrics::describe_counter!(
            Self::REORG_ROLLBACKS_TOTAL,
            metrics::Unit::Count,
            "Total number of indexed blocks rolled back after a reorg"
        );
        metrics::describe_counter!(
            Self::CYCLE_ERRORS_TOTAL,
            metrics::Unit::Count,
            "Total number of aborted sync cycles"
        );
        metrics::describe_histogram!(
            Self::CYCLE_DURATION_SECONDS,
            metrics::Unit::Seconds,
            "Duration of sync cycles"
        );
        metrics::describe_gauge!(Self::LOCAL_HEIGHT, "Next block height to index");
        metrics::describe_gauge!(Self::REMOTE_HEIGHT, "Head block height reported by the node");
        metrics::describe_gauge!(
            Self::PENDING_TRANSACTIONS,
            metrics::Unit::Count,
            "Number of mirrored mempool transactions"
        );
        metrics::describe_counter!(
            Self::ACCOUNTS_REFRESHED_TOTAL,
            metrics::Unit::Count,
            "Total number of refreshed account records"
        );
    }

    fn zero(shard: ShardNumber) {
        let shard = shard.to_string();
        metrics::counter!(Self::BLOCKS_INGESTED_TOTAL, "shard" => shard.clone()).increment(0);
        metrics::counter!(Self::INGEST_ERRORS_TOTAL, "shard" => shard.clone()).increment(0);
        metrics::counter!(Self::REORG_ROLLBACKS_TOTAL, "shard" => shard.clone()).increment(0);
        metrics::counter!(Self::CYCLE_ERRORS_TOTAL, "shard" => shard.clone()).increment(0);
        metrics::counter!(Self::ACCOUNTS_REFRESHED_TOTAL, "shard" => shard).increment(0);
    }

    pub(crate) fn record_ingested(shard: ShardNumber, next_height: u64) {
        let shard = shard.to_string();
        metrics::counter!(Self::BLOCKS_INGESTED_TOTAL, "shard" => shard.clone()).increment(1);
        metrics::gauge!(Self::LOCAL_HEIGHT, "shard" => shard).set(next_height as f64);
    }

    pub(crate) fn record_ingest_error(shard: ShardNumber) {
        metrics::counter!(Self::INGEST_ERRORS_TOTAL, "shard" => shard.to_string()).increment(1);
    }

    pub(crate) fn record_rollback(shard: ShardNumber) {
        metrics::counter!(Self::REORG_ROLLBACKS_TOTAL, "shard" => shard.to_string()).increment(1);
    }

    pub(crate) fn record_heights(shard: ShardNumber, local: u64, remote: u64) {
        let shard = shard.to_string();
        metrics::gauge!(Self::LOCAL_HEIGHT, "shard" => shard.clone()).set(local as f64);
        metrics::gauge!(Self::REMOTE_HEIGHT, "shard" => shard).set(remote as f64);
    }

    pub(crate) fn record_pending(shard: ShardNumber, count: usize) {
        metrics::gauge!(Self::PENDING_TRANSACTIONS, "shard" => shard.to_string()).set(count as f64);
    }

    pub(crate) fn record_accounts_refreshed(shard: ShardNumber, count: usize) {
        metrics::counter!(Self::ACCOUNTS_REFRESHED_TOTAL, "shard" => shard.to_string())
            .increment(count as u64);
    }

    pub(crate) fn record_cycle(shard: ShardNumber, elapsed: Duration, failed: bool) {
        let shard = shard.to_string();
        metrics::histogram!(Self::CYCLE_DURATION_SECONDS, "shard" => shard.clone())
            .record(elapsed.as_secs_f64());
        if failed {
            metrics::counter!(Self::CYCLE_ERRORS_TOTAL, "shard" => shard).increment(1);
        }
    }
}

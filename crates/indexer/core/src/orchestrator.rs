//! The per-shard sync loop.

use crate::{
    AccountProjector, BlockIngester, IngestOutcome, Metrics, PendingPoolMirror, ProjectionReport,
    ReorgResolver, SyncConfig, SyncError, TouchedAccounts, WorkerPool,
};
use derive_more::Display;
use shardex_rpc::ChainClient;
use shardex_storage::IndexStore;
use shardex_types::{LastBlock, ShardNumber};
use std::{sync::Arc, time::Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Phase of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SyncState {
    /// Not started yet.
    #[display("idle")]
    Idle,
    /// Checking indexed blocks against the chain.
    #[display("reorg_check")]
    ReorgCheck,
    /// Indexing blocks up to the chain tip.
    #[display("catch_up")]
    CatchUp,
    /// Refreshing the mempool snapshot.
    #[display("pending_mirror")]
    PendingMirror,
    /// Waiting for the next cycle.
    #[display("sleeping")]
    Sleeping,
}

/// Summary of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Heights rolled back by reorg resolution, newest first.
    pub rolled_back: Vec<u64>,
    /// Number of newly indexed blocks.
    pub ingested: u64,
    /// Account and miner refresh counts.
    pub projection: ProjectionReport,
    /// Size of the mirrored mempool.
    pub pending: usize,
}

/// Drives reorg resolution, catch-up, account refresh and mempool mirroring for one shard.
///
/// Exactly one orchestrator may write a given shard at a time.
#[derive(Debug)]
pub struct SyncOrchestrator<C, S> {
    config: SyncConfig,
    client: Arc<C>,
    store: Arc<S>,
    pool: Arc<WorkerPool>,
    ingester: BlockIngester<C, S>,
    resolver: ReorgResolver<C, S>,
    projector: AccountProjector<C, S>,
    mirror: PendingPoolMirror<C, S>,
    state: SyncState,
}

impl<C, S> SyncOrchestrator<C, S>
where
    C: ChainClient + 'static,
    S: IndexStore + 'static,
{
    /// Creates the orchestrator and spawns its worker pool on the current runtime.
    pub fn new(config: SyncConfig, client: Arc<C>, store: Arc<S>) -> Self {
        let shard = config.shard;
        let pool = Arc::new(WorkerPool::new(config.worker_count));

        Self {
            ingester: BlockIngester::new(
                shard,
                Arc::clone(&client),
                Arc::clone(&store),
                Arc::clone(&pool),
            ),
            resolver: ReorgResolver::new(shard, Arc::clone(&client), Arc::clone(&store)),
            projector: AccountProjector::new(
                shard,
                Arc::clone(&client),
                Arc::clone(&store),
                Arc::clone(&pool),
            ),
            mirror: PendingPoolMirror::new(shard, Arc::clone(&client), Arc::clone(&store)),
            config,
            client,
            store,
            pool,
            state: SyncState::Idle,
        }
    }

    /// Returns the shard being synchronized.
    pub const fn shard(&self) -> ShardNumber {
        self.config.shard
    }

    /// Returns the current phase.
    pub const fn state(&self) -> SyncState {
        self.state
    }

    fn transition(&mut self, state: SyncState) {
        debug!(target: "sync", shard = self.shard(), from = %self.state, to = %state, "State transition");
        self.state = state;
    }

    /// Runs cycles until `cancel` fires.
    ///
    /// Cycles start every `interval`; ticks missed while a cycle runs are skipped. Cancellation
    /// is observed between cycles only, so a running cycle always completes.
    pub async fn run(mut self, cancel: CancellationToken) {
        let shard = self.shard();
        info!(target: "sync", shard, interval = ?self.config.interval, "Starting shard syncer");

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(target: "sync", shard, "Syncer cancellation requested, stopping...");
                    break;
                }
                _ = interval.tick() => {}
            }

            // failures are logged by the cycle and retried on the next tick
            if let Ok(report) = self.run_cycle().await {
                if !report.rolled_back.is_empty() || report.ingested > 0 {
                    info!(
                        target: "sync",
                        shard,
                        rolled_back = report.rolled_back.len(),
                        ingested = report.ingested,
                        accounts = report.projection.accounts,
                        pending = report.pending,
                        "Sync cycle completed"
                    );
                }
            }
        }

        self.pool.shutdown().await;
        info!(target: "sync", shard, "Shard syncer stopped");
    }

    /// Performs one cycle: reorg check, catch-up to the chain tip, mempool mirror.
    ///
    /// Touched accounts are flushed after the reorg check, whenever catch-up collects the
    /// configured number of them, and once catch-up ends, including when it fails.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, SyncError> {
        let started = Instant::now();
        let result = self.cycle().await;
        if let Err(err) = &result {
            error!(target: "sync", shard = self.shard(), state = %self.state, %err, "Sync cycle failed");
        }
        Metrics::record_cycle(self.shard(), started.elapsed(), result.is_err());
        self.transition(SyncState::Sleeping);
        result
    }

    async fn cycle(&mut self) -> Result<CycleReport, SyncError> {
        let mut report = CycleReport::default();
        let mut touched = TouchedAccounts::new();

        self.transition(SyncState::ReorgCheck);
        let resolved = self.resolver.resolve(&mut touched).await;
        report.projection.merge(self.projector.flush(touched.take()).await);
        report.rolled_back = resolved?;

        self.transition(SyncState::CatchUp);
        let caught_up = self.catch_up(&mut touched, &mut report).await;
        report.projection.merge(self.projector.flush(touched.take()).await);
        caught_up?;
        self.log_block_rate();

        self.transition(SyncState::PendingMirror);
        report.pending = self.mirror.mirror().await?;

        Ok(report)
    }

    async fn catch_up(
        &self,
        touched: &mut TouchedAccounts,
        report: &mut CycleReport,
    ) -> Result<(), SyncError> {
        let shard = self.shard();
        let cursor = self.store.block_height(shard)?;
        let tip = self.client.current_block().await?.height;
        Metrics::record_heights(shard, cursor, tip);

        if cursor > tip {
            return Ok(());
        }
        debug!(target: "sync", shard, from = cursor, to = tip, "Catching up");

        for height in cursor..=tip {
            if let IngestOutcome::Indexed { .. } = self.ingester.ingest(height, touched).await? {
                report.ingested += 1;
            }
            if touched.len() >= self.config.flush_threshold {
                report.projection.merge(self.projector.flush(touched.take()).await);
            }
        }
        Ok(())
    }

    fn log_block_rate(&self) {
        match self.store.get_last_blocks(self.shard()) {
            Ok(markers) => {
                if let (Some(block_time), Some(tps)) =
                    (LastBlock::block_time(&markers), LastBlock::tps(&markers))
                {
                    debug!(target: "sync", shard = self.shard(), block_time, tps, "Block rate");
                }
            }
            Err(err) => {
                warn!(target: "sync", shard = self.shard(), %err, "Failed to read last block markers");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeChain;
    use alloy_primitives::Address;
    use shardex_storage::{BlockStorage, SqliteStore, TransactionStorage};
    use std::time::Duration;

    fn orchestrator(
        chain: &Arc<FakeChain>,
    ) -> (SyncOrchestrator<FakeChain, SqliteStore>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let config =
            SyncConfig::new(1).with_worker_count(2).with_interval(Duration::from_millis(10));
        (SyncOrchestrator::new(config, Arc::clone(chain), Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn test_cycle_reports_work() {
        let chain = Arc::new(FakeChain::new());
        let sender = Address::repeat_byte(1);
        chain.push_block(vec![chain.transfer(sender, Address::repeat_byte(2), 3)]);
        chain.set_pending(vec![chain.transfer(sender, Address::repeat_byte(3), 1)]);
        let (mut orchestrator, store) = orchestrator(&chain);
        assert_eq!(orchestrator.state(), SyncState::Idle);

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report.ingested, 2);
        assert!(report.rolled_back.is_empty());
        assert_eq!(report.pending, 1);
        // miner, null address, sender and recipient
        assert_eq!(report.projection.accounts, 4);
        assert_eq!(report.projection.miners, 1);
        assert_eq!(store.block_height(1).unwrap(), 2);
        assert_eq!(orchestrator.state(), SyncState::Sleeping);

        let report = orchestrator.run_cycle().await.unwrap();
        assert_eq!(report.ingested, 0);
    }

    #[tokio::test]
    async fn test_failed_catch_up_keeps_committed_blocks() {
        let chain = Arc::new(FakeChain::new());
        for _ in 0..3 {
            chain.push_block(Vec::new());
        }
        chain.fail_blocks_from(Some(2));
        let (mut orchestrator, store) = orchestrator(&chain);

        assert!(orchestrator.run_cycle().await.is_err());
        assert_eq!(store.block_height(1).unwrap(), 2);
        assert_eq!(orchestrator.state(), SyncState::Sleeping);

        chain.fail_blocks_from(None);
        let report = orchestrator.run_cycle().await.unwrap();
        assert_eq!(report.ingested, 2);
        assert_eq!(store.block_height(1).unwrap(), 4);
        assert_eq!(store.tx_count_by_shard(1).unwrap(), 4);
    }

    #[tokio::test]
    async fn test_reorg_during_catch_up_is_resolved_next_cycle() {
        let chain = Arc::new(FakeChain::new());
        chain.push_block(Vec::new());
        let (mut orchestrator, store) = orchestrator(&chain);
        orchestrator.run_cycle().await.unwrap();

        // height 2 is fetched from the old branch, then 2 and 3 are replaced
        chain.push_block(Vec::new());
        chain.push_block(Vec::new());
        chain.reorg_after_fetch(2, 2, 3);

        let err = orchestrator.run_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::ParentMismatch { height: 3, .. }));
        assert_eq!(store.block_height(1).unwrap(), 3);

        let report = orchestrator.run_cycle().await.unwrap();
        assert_eq!(report.rolled_back, vec![2]);
        assert_eq!(report.ingested, 3);
        for height in 0..=chain.tip() {
            let stored = store.get_block_by_height(1, height).unwrap().unwrap();
            assert_eq!(stored.hash, chain.block(height).unwrap().hash);
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let chain = Arc::new(FakeChain::new());
        let (orchestrator, store) = orchestrator(&chain);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(orchestrator.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(store.block_height(1).unwrap(), 1);
    }
}

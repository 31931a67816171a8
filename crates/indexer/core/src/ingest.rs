//! Indexing of a single canonical block.

use crate::{Metrics, SyncError, TouchedAccounts, WorkerPool};
use shardex_rpc::ChainClient;
use shardex_storage::{IndexStore, StorageError};
use shardex_types::{
    AccountType, Block, ChainTransaction, LastBlock, ShardNumber, Transaction, TxReceipt, TxSummary,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a successful [`BlockIngester::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The block and its transactions were written.
    Indexed {
        /// Height of the block.
        height: u64,
        /// Number of transactions written.
        tx_count: usize,
    },
    /// The same block was already fully indexed; nothing was written.
    AlreadyIndexed {
        /// Height of the block.
        height: u64,
    },
}

/// Fetches canonical blocks and writes them with their transactions.
#[derive(Debug)]
pub struct BlockIngester<C, S> {
    shard: ShardNumber,
    client: Arc<C>,
    store: Arc<S>,
    pool: Arc<WorkerPool>,
}

impl<C, S> BlockIngester<C, S>
where
    C: ChainClient + 'static,
    S: IndexStore + 'static,
{
    /// Creates an ingester for `shard`.
    pub const fn new(
        shard: ShardNumber,
        client: Arc<C>,
        store: Arc<S>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self { shard, client, store, pool }
    }

    /// Indexes the canonical block at `height` and records the accounts it touches.
    ///
    /// Transactions receive the next sequence numbers of the shard, so blocks must be ingested
    /// in height order by a single writer.
    pub async fn ingest(
        &self,
        height: u64,
        touched: &mut TouchedAccounts,
    ) -> Result<IngestOutcome, SyncError> {
        let outcome = self.try_ingest(height, touched).await;
        if outcome.is_err() {
            Metrics::record_ingest_error(self.shard);
        }
        outcome
    }

    async fn try_ingest(
        &self,
        height: u64,
        touched: &mut TouchedAccounts,
    ) -> Result<IngestOutcome, SyncError> {
        let shard = self.shard;
        let chain_block = self.client.block_by_height(height, true).await?;

        if let Some(stored) = self.store.get_block_by_height(shard, height)? {
            let complete = self.store.tx_count_by_height(shard, height)? ==
                stored.transactions.len() as u64;
            if stored.hash == chain_block.hash && complete {
                debug!(target: "ingester", shard, height, "Block already indexed");
                return Ok(IngestOutcome::AlreadyIndexed { height });
            }
            return Err(SyncError::HeightOccupied {
                shard,
                height,
                stored: stored.hash,
                remote: chain_block.hash,
            });
        }

        // the block must extend the indexed chain, which may be stale after a reorg
        let parent_hash = chain_block.header.previous_block_hash;
        let parent = match height.checked_sub(1) {
            Some(parent_height) => self.store.get_block_by_height(shard, parent_height)?,
            None => None,
        };
        if let Some(parent) = parent.filter(|parent| parent.hash != parent_hash) {
            return Err(SyncError::ParentMismatch {
                shard,
                height,
                stored: parent.hash,
                parent: parent_hash,
            });
        }

        let receipts = self.fetch_receipts(&chain_block.transactions, height).await;

        let base_idx = self.store.tx_count_by_shard(shard)?;
        let timestamp = chain_block.header.create_timestamp;
        let txs: Vec<Transaction> = chain_block
            .transactions
            .iter()
            .zip(&receipts)
            .enumerate()
            .map(|(position, (tx, receipt))| {
                Transaction::mined(
                    tx,
                    shard,
                    height,
                    timestamp,
                    base_idx + 1 + position as u64,
                    receipt.as_ref(),
                )
            })
            .collect();

        let block = Block {
            shard,
            height,
            hash: chain_block.hash,
            parent_hash,
            timestamp,
            difficulty: chain_block.header.difficulty,
            creator: chain_block.header.creator,
            used_gas: txs.iter().fold(0u64, |acc, tx| acc.saturating_add(tx.receipt.used_gas)),
            debt_accounts: chain_block.debts.iter().map(|debt| debt.account).collect(),
            transactions: txs.iter().map(TxSummary::from).collect(),
        };

        self.store.add_block(&block)?;
        self.store.add_txs(&txs)?;

        touched.record_block(&block, &txs);
        for account in &block.debt_accounts {
            touched.touch(*account, AccountType::Normal, timestamp);
        }

        if let Err(err) = self.update_last_blocks(&block) {
            warn!(target: "ingester", shard, height, %err, "Failed to update last block markers");
        }

        Metrics::record_ingested(shard, height + 1);
        debug!(target: "ingester", shard, height, txs = txs.len(), "Indexed block");
        Ok(IngestOutcome::Indexed { height, tx_count: txs.len() })
    }

    /// Fetches the receipts of `txs` in parallel. A failed lookup yields `None`.
    async fn fetch_receipts(
        &self,
        txs: &[ChainTransaction],
        height: u64,
    ) -> Vec<Option<TxReceipt>> {
        let lookups = txs.iter().map(|tx| {
            let client = Arc::clone(&self.client);
            let hash = tx.hash;
            async move { (hash, client.receipt_by_tx_hash(hash).await) }
        });

        self.pool
            .join_all(lookups)
            .await
            .into_iter()
            .map(|lookup| match lookup {
                Some((_, Ok(receipt))) => Some(receipt),
                Some((hash, Err(err))) => {
                    warn!(target: "ingester", shard = self.shard, height, %hash, %err, "Failed to fetch receipt");
                    None
                }
                None => {
                    warn!(target: "ingester", shard = self.shard, height, "Receipt lookup panicked");
                    None
                }
            })
            .collect()
    }

    /// Points one of the two last block markers at `block`.
    ///
    /// Both slots are initialized with the block when fewer than two exist. Otherwise the slot
    /// already holding this height is replaced, or else the one with the lower height.
    fn update_last_blocks(&self, block: &Block) -> Result<(), StorageError> {
        let markers = self.store.get_last_blocks(self.shard)?;
        if markers.len() < LastBlock::SLOTS {
            self.store.remove_last_blocks_by_shard(self.shard)?;
            let markers = [LastBlock::new(block, 0), LastBlock::new(block, 1)];
            return self.store.add_last_blocks(&markers);
        }

        let slot = markers
            .iter()
            .find(|marker| marker.height == block.height)
            .or_else(|| markers.iter().min_by_key(|marker| marker.height))
            .map_or(0, |marker| marker.slot);
        self.store.update_last_block(&LastBlock::new(block, slot))
    }
}

//! Mirroring of the chain node's mempool.

use crate::{Metrics, SyncError};
use shardex_rpc::ChainClient;
use shardex_storage::IndexStore;
use shardex_types::{PendingTransaction, ShardNumber, Transaction};
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

/// Replaces the stored pending transactions of a shard with the node's current mempool.
#[derive(Debug)]
pub struct PendingPoolMirror<C, S> {
    shard: ShardNumber,
    client: Arc<C>,
    store: Arc<S>,
}

impl<C, S> PendingPoolMirror<C, S>
where
    C: ChainClient,
    S: IndexStore,
{
    /// Creates a mirror for `shard`.
    pub const fn new(shard: ShardNumber, client: Arc<C>, store: Arc<S>) -> Self {
        Self { shard, client, store }
    }

    /// Takes a fresh mempool snapshot and returns its size.
    ///
    /// The mempool is fetched before anything is deleted and the snapshot is swapped in one
    /// store transaction, so a failed fetch or write leaves the previous snapshot in place.
    /// Duplicate hashes keep their first occurrence; sequence numbers run from `1` in the node's
    /// order.
    pub async fn mirror(&self) -> Result<usize, SyncError> {
        let fetched = self.client.pending_transactions().await?;

        let mut seen = HashSet::with_capacity(fetched.len());
        let pending: Vec<PendingTransaction> = fetched
            .iter()
            .filter(|tx| seen.insert(tx.hash))
            .enumerate()
            .map(|(position, tx)| Transaction::pending(tx, self.shard, position as u64 + 1))
            .collect();

        self.store.replace_pending_txs(self.shard, &pending)?;

        Metrics::record_pending(self.shard, pending.len());
        debug!(
            target: "pending",
            shard = self.shard,
            fetched = fetched.len(),
            stored = pending.len(),
            "Mirrored mempool"
        );
        Ok(pending.len())
    }
}

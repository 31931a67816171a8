//! Detection and rollback of indexed blocks that left the canonical chain.

use crate::{Metrics, SyncError, TouchedAccounts};
use shardex_rpc::ChainClient;
use shardex_storage::IndexStore;
use shardex_types::{AccountType, Block, ShardNumber};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Walks back from the newest indexed block until it finds one the chain still agrees with,
/// rolling back everything above it.
#[derive(Debug)]
pub struct ReorgResolver<C, S> {
    shard: ShardNumber,
    client: Arc<C>,
    store: Arc<S>,
}

impl<C, S> ReorgResolver<C, S>
where
    C: ChainClient,
    S: IndexStore,
{
    /// Creates a resolver for `shard`.
    pub const fn new(shard: ShardNumber, client: Arc<C>, store: Arc<S>) -> Self {
        Self { shard, client, store }
    }

    /// Rolls back every indexed block that is no longer canonical and records the accounts
    /// they touched in `touched`.
    ///
    /// Returns the rolled back heights, newest first. A failed request aborts the walk; blocks
    /// rolled back until then stay rolled back and are already recorded in `touched`.
    pub async fn resolve(&self, touched: &mut TouchedAccounts) -> Result<Vec<u64>, SyncError> {
        let shard = self.shard;
        let next = self.store.block_height(shard)?;
        let mut rolled_back = Vec::new();

        for height in (0..next).rev() {
            let Some(stored) = self.store.get_block_by_height(shard, height)? else {
                continue;
            };

            if self.is_consistent(&stored).await? {
                trace!(target: "reorg", shard, height, "Found consistent block");
                break;
            }

            self.rollback(&stored, touched)?;
            rolled_back.push(height);
        }

        if !rolled_back.is_empty() {
            info!(
                target: "reorg",
                shard,
                depth = rolled_back.len(),
                from = next - 1,
                to = next - rolled_back.len() as u64,
                "Rolled back non-canonical blocks"
            );
        }
        Ok(rolled_back)
    }

    /// A stored block is consistent when the chain still has it at its height and all of its
    /// transactions were written.
    ///
    /// The tip is re-read for every block since the chain may shrink during the walk.
    async fn is_consistent(&self, stored: &Block) -> Result<bool, SyncError> {
        let tip = self.client.current_block().await?.height;
        if stored.height > tip {
            debug!(target: "reorg", shard = self.shard, height = stored.height, tip, "Block above chain tip");
            return Ok(false);
        }

        let canonical = self.client.block_by_height(stored.height, false).await?;
        if canonical.hash != stored.hash {
            debug!(
                target: "reorg",
                shard = self.shard,
                height = stored.height,
                stored = %stored.hash,
                canonical = %canonical.hash,
                "Block hash mismatch"
            );
            return Ok(false);
        }

        let written = self.store.tx_count_by_height(self.shard, stored.height)?;
        if written != stored.transactions.len() as u64 {
            debug!(
                target: "reorg",
                shard = self.shard,
                height = stored.height,
                written,
                expected = stored.transactions.len(),
                "Block is missing transactions"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Removes `block` and its transactions. Transactions go first so an interrupted rollback
    /// leaves an incomplete block that the next walk removes.
    fn rollback(&self, block: &Block, touched: &mut TouchedAccounts) -> Result<(), SyncError> {
        let txs = self.store.get_txs_by_height(self.shard, block.height)?;

        touched.touch(block.creator, AccountType::Normal, block.timestamp);
        touched.touch_miner(block.creator);
        for tx in &txs {
            touched.record_transaction(tx, block.timestamp);
        }
        for account in &block.debt_accounts {
            touched.touch(*account, AccountType::Normal, block.timestamp);
        }

        self.store.remove_txs(self.shard, block.height)?;
        self.store.remove_block(self.shard, block.height)?;

        Metrics::record_rollback(self.shard);
        debug!(target: "reorg", shard = self.shard, height = block.height, txs = txs.len(), "Rolled back block");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockIngester, WorkerPool, test_utils::FakeChain};
    use alloy_primitives::{Address, B256};
    use async_trait::async_trait;
    use mockall::mock;
    use shardex_rpc::{ChainClientError, ClientError};
    use shardex_storage::{BlockStorage, SqliteStore, TransactionStorage};
    use shardex_types::{ChainBlock, ChainHead, ChainTransaction, TxReceipt};

    mock! {
        #[derive(Debug)]
        pub Chain {}

        #[async_trait]
        impl ChainClient for Chain {
            async fn current_block(&self) -> Result<ChainHead, ChainClientError>;
            async fn block_by_height(
                &self,
                height: u64,
                full_tx: bool,
            ) -> Result<ChainBlock, ChainClientError>;
            async fn receipt_by_tx_hash(&self, hash: B256) -> Result<TxReceipt, ChainClientError>;
            async fn balance(&self, address: Address) -> Result<u64, ChainClientError>;
            async fn pending_transactions(&self) -> Result<Vec<ChainTransaction>, ChainClientError>;
        }
    }

    async fn index_chain(chain: &Arc<FakeChain>) -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let pool = Arc::new(WorkerPool::new(2));
        let ingester = BlockIngester::new(1, Arc::clone(chain), Arc::clone(&store), pool);
        let mut touched = TouchedAccounts::new();
        for height in 0..=chain.tip() {
            ingester.ingest(height, &mut touched).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_no_reorg_keeps_everything() {
        let chain = Arc::new(FakeChain::new());
        chain.push_block(Vec::new());
        let store = index_chain(&chain).await;

        let resolver = ReorgResolver::new(1, Arc::clone(&chain), Arc::clone(&store));
        let mut touched = TouchedAccounts::new();

        assert!(resolver.resolve(&mut touched).await.unwrap().is_empty());
        assert!(touched.is_empty());
        assert_eq!(store.block_height(1).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_store_is_noop() {
        let chain = Arc::new(FakeChain::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let resolver = ReorgResolver::new(1, chain, store);

        assert!(resolver.resolve(&mut TouchedAccounts::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rolls_back_replaced_branch() {
        let chain = Arc::new(FakeChain::new());
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);
        for _ in 0..4 {
            chain.push_block(vec![chain.transfer(alice, bob, 1)]);
        }
        let store = index_chain(&chain).await;
        let indexed_txs = store.tx_count_by_shard(1).unwrap();

        // replace heights 3 and 4 with a single block
        chain.reorg(2);
        chain.push_block(Vec::new());

        let resolver = ReorgResolver::new(1, Arc::clone(&chain), Arc::clone(&store));
        let mut touched = TouchedAccounts::new();
        let rolled_back = resolver.resolve(&mut touched).await.unwrap();

        assert_eq!(rolled_back, vec![4, 3]);
        assert_eq!(store.block_height(1).unwrap(), 3);
        assert_eq!(store.tx_count_by_shard(1).unwrap(), indexed_txs - 4);
        assert!(touched.get(&alice).is_some());
        assert!(touched.get(&bob).is_some());
    }

    #[tokio::test]
    async fn test_rollback_touches_debt_accounts() {
        let chain = Arc::new(FakeChain::new());
        let creditor = Address::repeat_byte(0xdd);
        chain.push_block_with_debts(Vec::new(), &[(creditor, 50)]);
        let store = index_chain(&chain).await;

        chain.reorg(1);
        chain.push_block(Vec::new());

        let resolver = ReorgResolver::new(1, Arc::clone(&chain), Arc::clone(&store));
        let mut touched = TouchedAccounts::new();

        assert_eq!(resolver.resolve(&mut touched).await.unwrap(), vec![1]);
        assert!(touched.get(&creditor).is_some());
    }

    #[tokio::test]
    async fn test_incomplete_block_is_rolled_back() {
        let chain = Arc::new(FakeChain::new());
        chain.push_block(vec![chain.transfer(Address::repeat_byte(1), Address::repeat_byte(2), 1)]);
        let store = index_chain(&chain).await;

        // simulate a crash between writing the block and its transactions
        store.remove_txs(1, 1).unwrap();

        let resolver = ReorgResolver::new(1, Arc::clone(&chain), Arc::clone(&store));
        let rolled_back = resolver.resolve(&mut TouchedAccounts::new()).await.unwrap();

        assert_eq!(rolled_back, vec![1]);
        assert_eq!(store.block_height(1).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rpc_failure_aborts_without_rollback() {
        let chain = Arc::new(FakeChain::new());
        chain.push_block(Vec::new());
        let store = index_chain(&chain).await;

        let mut client = MockChain::new();
        client
            .expect_current_block()
            .returning(|| Ok(ChainHead { height: 1, ..Default::default() }));
        client
            .expect_block_by_height()
            .returning(|_, _| Err(ChainClientError::Rpc(ClientError::RequestTimeout)));

        let resolver = ReorgResolver::new(1, Arc::new(client), Arc::clone(&store));
        let err = resolver.resolve(&mut TouchedAccounts::new()).await.unwrap_err();

        assert!(matches!(err, SyncError::Chain(_)));
        assert_eq!(store.block_height(1).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_blocks_above_shrunk_tip_are_rolled_back() {
        let chain = Arc::new(FakeChain::new());
        chain.push_block(Vec::new());
        chain.push_block(Vec::new());
        let store = index_chain(&chain).await;

        let mut client = MockChain::new();
        client
            .expect_current_block()
            .returning(|| Ok(ChainHead { height: 1, ..Default::default() }));
        let canonical = chain.block(1).unwrap();
        client
            .expect_block_by_height()
            .withf(|height, _| *height == 1)
            .times(1)
            .returning(move |_, _| Ok(canonical.clone()));

        let resolver = ReorgResolver::new(1, Arc::new(client), Arc::clone(&store));
        let rolled_back = resolver.resolve(&mut TouchedAccounts::new()).await.unwrap();

        assert_eq!(rolled_back, vec![2]);
        assert_eq!(store.block_height(1).unwrap(), 2);
    }
}

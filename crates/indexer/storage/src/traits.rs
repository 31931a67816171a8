use crate::StorageError;
use alloy_primitives::{Address, B256};
use shardex_types::{
    Account, Block, LastBlock, MinedBlockStats, MinerAccount, PendingTransaction, ShardNumber,
    Transaction,
};
use std::fmt::Debug;

/// Provides access to indexed blocks.
///
/// Heights of one shard are contiguous from `0`, so the next height to index is always one past
/// the highest stored block.
pub trait BlockStorage {
    /// Returns the height the next indexed block of `shard` will occupy.
    ///
    /// This is `0` for an empty shard and `max stored height + 1` otherwise. The sync loop reads
    /// its resume cursor from here at the start of every cycle.
    fn block_height(&self, shard: ShardNumber) -> Result<u64, StorageError>;

    /// Inserts a new block.
    ///
    /// # Returns
    /// * `Err(StorageError::Conflict)` if a block is already stored at the same shard and height.
    fn add_block(&self, block: &Block) -> Result<(), StorageError>;

    /// Replaces the block stored at the same shard and height.
    fn update_block(&self, block: &Block) -> Result<(), StorageError>;

    /// Removes the block at `height`. Removing a missing block is not an error.
    fn remove_block(&self, shard: ShardNumber, height: u64) -> Result<(), StorageError>;

    /// Returns the block stored at `height`, if any.
    fn get_block_by_height(
        &self,
        shard: ShardNumber,
        height: u64,
    ) -> Result<Option<Block>, StorageError>;

    /// Counts the blocks of `shard` created by `address`.
    fn mined_blocks_count(&self, shard: ShardNumber, address: Address) -> Result<u64, StorageError>;

    /// Computes the mined block count, received block rewards and collected fees of `address`
    /// on `shard`.
    fn mined_block_stats(
        &self,
        shard: ShardNumber,
        address: Address,
    ) -> Result<MinedBlockStats, StorageError>;
}

/// Provides access to indexed (mined) transactions.
pub trait TransactionStorage {
    /// Inserts a single transaction.
    fn add_tx(&self, tx: &Transaction) -> Result<(), StorageError>;

    /// Inserts a batch of transactions. The batch is written atomically.
    fn add_txs(&self, txs: &[Transaction]) -> Result<(), StorageError>;

    /// Removes every transaction of the block at `height`.
    fn remove_txs(&self, shard: ShardNumber, height: u64) -> Result<(), StorageError>;

    /// Returns the transactions of the block at `height`, ordered by `idx`.
    fn get_txs_by_height(
        &self,
        shard: ShardNumber,
        height: u64,
    ) -> Result<Vec<Transaction>, StorageError>;

    /// Returns the transaction with the given hash.
    fn get_tx_by_hash(
        &self,
        shard: ShardNumber,
        hash: B256,
    ) -> Result<Option<Transaction>, StorageError>;

    /// Counts all transactions of `shard`.
    fn tx_count_by_shard(&self, shard: ShardNumber) -> Result<u64, StorageError>;

    /// Counts the transactions of the block at `height`.
    fn tx_count_by_height(&self, shard: ShardNumber, height: u64) -> Result<u64, StorageError>;

    /// Counts the transactions of `shard` sent by `address` or addressed to it, including
    /// contracts it deployed as recipient.
    fn tx_count_by_address(
        &self,
        shard: ShardNumber,
        address: Address,
    ) -> Result<u64, StorageError>;
}

/// Provides access to account and miner records.
pub trait AccountStorage {
    /// Returns the account stored for `address`.
    fn get_account(&self, address: Address) -> Result<Option<Account>, StorageError>;

    /// Inserts a new account.
    fn add_account(&self, account: &Account) -> Result<(), StorageError>;

    /// Overwrites an existing account.
    ///
    /// # Returns
    /// * `Err(StorageError::EntryNotFound)` if no account is stored for the address.
    fn update_account(&self, account: &Account) -> Result<(), StorageError>;

    /// Sets the mined block count of an existing account.
    fn update_account_mined_blocks(
        &self,
        address: Address,
        mined_blocks: u64,
    ) -> Result<(), StorageError>;

    /// Returns the miner record stored for `address`.
    fn get_miner_account(&self, address: Address) -> Result<Option<MinerAccount>, StorageError>;

    /// Inserts or overwrites a miner record.
    fn update_miner_account(&self, miner: &MinerAccount) -> Result<(), StorageError>;
}

/// Provides access to the mempool snapshot.
pub trait PendingTxStorage {
    /// Removes every pending transaction of `shard`.
    fn remove_all_pending_txs(&self, shard: ShardNumber) -> Result<(), StorageError>;

    /// Inserts a single pending transaction.
    fn add_pending_tx(&self, tx: &PendingTransaction) -> Result<(), StorageError>;

    /// Inserts a batch of pending transactions atomically.
    fn add_pending_txs(&self, txs: &[PendingTransaction]) -> Result<(), StorageError>;

    /// Replaces the pending transactions of `shard` with `txs` in one transaction. On failure
    /// the previous snapshot is kept.
    fn replace_pending_txs(
        &self,
        shard: ShardNumber,
        txs: &[PendingTransaction],
    ) -> Result<(), StorageError>;

    /// Returns the pending transactions of `shard`, ordered by `idx`.
    fn get_pending_txs(&self, shard: ShardNumber) -> Result<Vec<PendingTransaction>, StorageError>;
}

/// Provides access to the two most recent block markers of each shard.
pub trait LastBlockStorage {
    /// Returns the markers of `shard`, ordered by slot.
    fn get_last_blocks(&self, shard: ShardNumber) -> Result<Vec<LastBlock>, StorageError>;

    /// Inserts markers.
    fn add_last_blocks(&self, markers: &[LastBlock]) -> Result<(), StorageError>;

    /// Overwrites the marker in the same shard and slot.
    fn update_last_block(&self, marker: &LastBlock) -> Result<(), StorageError>;

    /// Removes every marker of `shard`.
    fn remove_last_blocks_by_shard(&self, shard: ShardNumber) -> Result<(), StorageError>;
}

/// The complete store consumed by the sync engine.
pub trait IndexStore:
    BlockStorage
    + TransactionStorage
    + AccountStorage
    + PendingTxStorage
    + LastBlockStorage
    + Debug
    + Send
    + Sync
{
}

impl<T> IndexStore for T where
    T: BlockStorage
        + TransactionStorage
        + AccountStorage
        + PendingTxStorage
        + LastBlockStorage
        + Debug
        + Send
        + Sync
{
}

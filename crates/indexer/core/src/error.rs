use alloy_primitives::B256;
use shardex_rpc::ChainClientError;
use shardex_storage::StorageError;
use shardex_types::ShardNumber;
use thiserror::Error;

/// Errors that abort a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A request to the chain node failed.
    #[error(transparent)]
    Chain(#[from] ChainClientError),

    /// A store operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A different block is already indexed at the height being ingested. The next reorg check
    /// rolls it back.
    #[error("shard {shard} already indexes block {stored} at height {height}, chain has {remote}")]
    HeightOccupied {
        /// Shard of the block.
        shard: ShardNumber,
        /// Contested height.
        height: u64,
        /// Hash of the indexed block.
        stored: B256,
        /// Hash of the canonical block.
        remote: B256,
    },

    /// The block being ingested does not extend the indexed block below it. The chain
    /// reorganized since that block was indexed; the next reorg check rolls it back.
    #[error("shard {shard} block {height} extends {parent}, indexed parent is {stored}")]
    ParentMismatch {
        /// Shard of the block.
        shard: ShardNumber,
        /// Height of the block being ingested.
        height: u64,
        /// Hash of the indexed block at `height - 1`.
        stored: B256,
        /// Parent hash of the canonical block.
        parent: B256,
    },
}

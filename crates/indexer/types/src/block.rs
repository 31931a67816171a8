//! Indexed block records.

use crate::{ShardNumber, Transaction};
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Compact view of a transaction embedded in its [`Block`] record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxSummary {
    /// Transaction hash.
    pub hash: B256,
    /// Sender.
    pub from: Address,
    /// Recipient, `None` for contract creation.
    pub to: Option<Address>,
    /// Transferred amount.
    pub amount: u64,
    /// Fee paid.
    pub fee: u64,
}

impl From<&Transaction> for TxSummary {
    fn from(tx: &Transaction) -> Self {
        Self { hash: tx.hash, from: tx.from, to: tx.to, amount: tx.amount, fee: tx.fee }
    }
}

/// A block as stored in the index.
///
/// One record exists per `(shard, height)`. It is written before the block's transactions, so
/// a reader that sees the block may briefly not see all of them; the record carries the
/// summaries so the count can be verified.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    /// Shard the block belongs to.
    pub shard: ShardNumber,
    /// Block height.
    pub height: u64,
    /// Block hash.
    pub hash: B256,
    /// Parent block hash.
    pub parent_hash: B256,
    /// Creation timestamp, in seconds.
    pub timestamp: u64,
    /// Proof-of-work difficulty.
    pub difficulty: u64,
    /// Miner address.
    pub creator: Address,
    /// Sum of the gas used by the block's transactions, as far as receipts were available.
    pub used_gas: u64,
    /// Accounts credited by the cross-shard debts settled in the block, in block order.
    pub debt_accounts: Vec<Address>,
    /// Ordered transaction summaries.
    pub transactions: Vec<TxSummary>,
}

impl Block {
    /// Total fees of the block's transactions.
    pub fn total_fee(&self) -> u64 {
        self.transactions.iter().fold(0u64, |acc, tx| acc.saturating_add(tx.fee))
    }
}

/// One of the two most recent block markers kept per shard.
///
/// Downstream statistics derive block time and throughput from the pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LastBlock {
    /// Shard of the marker.
    pub shard: ShardNumber,
    /// Slot index, `0` or `1`.
    pub slot: u8,
    /// Height of the referenced block.
    pub height: u64,
    /// Hash of the referenced block.
    pub hash: B256,
    /// Timestamp of the referenced block.
    pub timestamp: u64,
    /// Number of transactions in the referenced block.
    pub tx_count: u64,
}

impl LastBlock {
    /// Number of marker slots kept per shard.
    pub const SLOTS: usize = 2;

    /// Builds a marker for `block` in the given slot.
    pub fn new(block: &Block, slot: u8) -> Self {
        Self {
            shard: block.shard,
            slot,
            height: block.height,
            hash: block.hash,
            timestamp: block.timestamp,
            tx_count: block.transactions.len() as u64,
        }
    }

    /// Seconds elapsed between the older and the newer marker.
    ///
    /// Returns `None` unless both markers exist.
    pub fn block_time(markers: &[Self]) -> Option<u64> {
        let (older, newer) = Self::ordered(markers)?;
        Some(newer.timestamp.saturating_sub(older.timestamp))
    }

    /// Transactions per second of the newest block, measured over the time since the older
    /// marker.
    ///
    /// This is an integer division, so throughput below one transaction per second reports `0`.
    /// Readers compare against this exact value, keep it truncating.
    pub fn tps(markers: &[Self]) -> Option<u64> {
        let (_, newer) = Self::ordered(markers)?;
        let elapsed = Self::block_time(markers)?;
        if elapsed == 0 {
            return Some(0);
        }
        Some(newer.tx_count / elapsed)
    }

    fn ordered(markers: &[Self]) -> Option<(&Self, &Self)> {
        let [a, b] = markers else {
            return None;
        };
        if a.height <= b.height { Some((a, b)) } else { Some((b, a)) }
    }
}

//! Indexed account records.

use crate::ShardNumber;
use alloy_primitives::Address;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Kind of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Externally owned account.
    #[default]
    #[display("normal")]
    Normal,
    /// Deployed contract.
    #[display("contract")]
    Contract,
}

impl AccountType {
    /// Numeric code used by the store.
    pub const fn code(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Contract => 1,
        }
    }

    /// Decodes a store code. Unknown codes are treated as [`AccountType::Normal`].
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Contract,
            _ => Self::Normal,
        }
    }
}

/// An account as stored in the index.
///
/// `balance` is always the value the chain reported at `updated_at`; it is never derived from
/// indexed transfers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Account {
    /// Account address.
    pub address: Address,
    /// Shard of the account.
    pub shard: ShardNumber,
    /// Account kind.
    pub account_type: AccountType,
    /// Balance at the last refresh.
    pub balance: u64,
    /// Number of indexed transactions sent or received.
    pub tx_count: u64,
    /// Number of indexed blocks mined by this address.
    pub mined_blocks: u64,
    /// Timestamp of the last refresh.
    pub updated_at: u64,
}

impl Account {
    /// An empty record, as created on first reference.
    pub fn empty(address: Address, shard: ShardNumber, account_type: AccountType) -> Self {
        Self { address, shard, account_type, ..Default::default() }
    }
}

/// Aggregates of the blocks one address mined on one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MinedBlockStats {
    /// Number of mined blocks.
    pub count: u64,
    /// Sum of block rewards received.
    pub reward: u64,
    /// Sum of fees of the transactions in mined blocks.
    pub fee: u64,
}

/// A block producer as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MinerAccount {
    /// Miner address.
    pub address: Address,
    /// Shard of the miner.
    pub shard: ShardNumber,
    /// Number of mined blocks.
    pub mined_blocks: u64,
    /// Cumulative block reward.
    pub reward: u64,
    /// Cumulative fees collected.
    pub fee: u64,
    /// `reward + fee`.
    pub revenue: u64,
}

impl MinerAccount {
    /// Builds the record from freshly computed aggregates.
    pub const fn from_stats(address: Address, shard: ShardNumber, stats: MinedBlockStats) -> Self {
        Self {
            address,
            shard,
            mined_blocks: stats.count,
            reward: stats.reward,
            fee: stats.fee,
            revenue: stats.reward.saturating_add(stats.fee),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_codes() {
        assert_eq!(AccountType::from_code(AccountType::Contract.code()), AccountType::Contract);
        assert_eq!(AccountType::from_code(AccountType::Normal.code()), AccountType::Normal);
        assert_eq!(AccountType::from_code(7), AccountType::Normal);
        assert_eq!(AccountType::Contract.to_string(), "contract");
    }

    #[test]
    fn test_miner_revenue() {
        let stats = MinedBlockStats { count: 2, reward: 100, fee: 5 };
        let miner = MinerAccount::from_stats(Address::repeat_byte(1), 1, stats);
        assert_eq!(miner.revenue, 105);
        assert_eq!(miner.mined_blocks, 2);
    }
}

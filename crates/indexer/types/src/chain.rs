//! Types returned by the chain node.
//!
//! Field names follow the node's JSON encoding: the chain info and block header objects use
//! `PascalCase` keys, transactions and receipts use `camelCase`.

use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

/// Summary of the node's current head block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainHead {
    /// Height of the head block.
    #[serde(rename = "CurrentBlockHeight")]
    pub height: u64,
    /// Hash of the head block.
    #[serde(rename = "HeaderHash")]
    pub hash: B256,
    /// Creation timestamp of the head block.
    #[serde(rename = "CurrentBlockTimestamp", default)]
    pub timestamp: u64,
    /// Difficulty of the head block.
    #[serde(rename = "CurrentBlockDifficulty", default)]
    pub difficulty: u64,
    /// Address that mined the head block.
    #[serde(rename = "Coinbase", default)]
    pub creator: Address,
}

/// Header of a block as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChainHeader {
    /// Hash of the parent block.
    pub previous_block_hash: B256,
    /// Address that mined the block.
    pub creator: Address,
    /// Proof-of-work difficulty.
    pub difficulty: u64,
    /// Block height.
    pub height: u64,
    /// Creation timestamp, in seconds.
    pub create_timestamp: u64,
}

/// A transaction as returned by the node, either inside a block or from the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender.
    pub from: Address,
    /// Recipient. Absent (or the zero address) for contract creation.
    #[serde(default)]
    pub to: Option<Address>,
    /// Transferred amount.
    pub amount: u64,
    /// Sender nonce.
    pub account_nonce: u64,
    /// Call data or contract code.
    #[serde(default)]
    pub payload: Bytes,
    /// Price per unit of gas.
    #[serde(default)]
    pub gas_price: u64,
    /// Gas limit.
    #[serde(default)]
    pub gas_limit: u64,
    /// Submission timestamp, zero when the node does not report one.
    #[serde(default)]
    pub timestamp: u64,
}

impl ChainTransaction {
    /// Returns the recipient, treating the zero address as absent.
    pub fn recipient(&self) -> Option<Address> {
        self.to.filter(|to| !to.is_zero())
    }

    /// Returns `true` when the transaction deploys a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.recipient().is_none()
    }
}

/// A cross-shard debt carried by a block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDebt {
    /// Debt hash.
    pub hash: B256,
    /// Hash of the originating transaction on the source shard.
    pub tx_hash: B256,
    /// Credited account.
    pub account: Address,
    /// Credited amount.
    pub amount: u64,
    /// Fee paid for the debt.
    #[serde(default)]
    pub fee: u64,
}

/// A block with its transactions and debts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainBlock {
    /// Block hash.
    pub hash: B256,
    /// Block header.
    pub header: ChainHeader,
    /// Ordered transactions. The first entry is the block reward transaction.
    #[serde(default)]
    pub transactions: Vec<ChainTransaction>,
    /// Cross-shard debts settled in this block.
    #[serde(default)]
    pub debts: Vec<ChainDebt>,
}

impl ChainBlock {
    /// Returns the block height.
    pub const fn height(&self) -> u64 {
        self.header.height
    }
}

/// Post-execution result of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    /// Execution return data.
    #[serde(default)]
    pub result: Bytes,
    /// State root after execution.
    #[serde(default)]
    pub post_state: B256,
    /// Deployed contract address for creation transactions.
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// Gas consumed by the transaction.
    pub used_gas: u64,
    /// Whether execution reverted.
    #[serde(default)]
    pub failed: bool,
}

/// Balance response of the node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountBalance {
    /// Queried account.
    pub account: Address,
    /// Balance at the head block.
    pub balance: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_block_deserializes_from_node_json() {
        let raw = r#"{
            "hash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "header": {
                "PreviousBlockHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
                "Creator": "0x4c10f2cd2159bb432094e3be7e17904c2b4aeb21",
                "Difficulty": 5,
                "Height": 12,
                "CreateTimestamp": 1537364231
            },
            "transactions": [{
                "hash": "0x0202020202020202020202020202020202020202020202020202020202020202",
                "from": "0x0000000000000000000000000000000000000000",
                "to": "0x4c10f2cd2159bb432094e3be7e17904c2b4aeb21",
                "amount": 150000000,
                "accountNonce": 0,
                "payload": "0x"
            }],
            "debts": []
        }"#;

        let block: ChainBlock = serde_json::from_str(raw).unwrap();
        assert_eq!(block.height(), 12);
        assert_eq!(block.header.creator, address!("4c10f2cd2159bb432094e3be7e17904c2b4aeb21"));
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].amount, 150_000_000);
        assert!(!block.transactions[0].is_contract_creation());
    }

    #[test]
    fn test_zero_recipient_is_contract_creation() {
        let tx = ChainTransaction { to: Some(Address::ZERO), ..Default::default() };
        assert!(tx.is_contract_creation());
        assert_eq!(tx.recipient(), None);

        let tx = ChainTransaction { to: None, ..Default::default() };
        assert!(tx.is_contract_creation());
    }

    #[test]
    fn test_head_deserializes_with_missing_optional_fields() {
        let raw = r#"{
            "CurrentBlockHeight": 99,
            "HeaderHash": "0x0303030303030303030303030303030303030303030303030303030303030303"
        }"#;
        let head: ChainHead = serde_json::from_str(raw).unwrap();
        assert_eq!(head.height, 99);
        assert_eq!(head.creator, Address::ZERO);
    }
}

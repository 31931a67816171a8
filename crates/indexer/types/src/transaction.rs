//! Indexed transaction records.

use crate::{ChainTransaction, ShardNumber, TxReceipt};
use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

/// The part of a [`TxReceipt`] kept alongside the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReceiptSummary {
    /// Deployed contract address, for contract creation.
    pub contract_address: Option<Address>,
    /// Execution return data.
    pub result: Bytes,
    /// Gas consumed.
    pub used_gas: u64,
    /// Whether execution reverted.
    pub failed: bool,
}

impl From<&TxReceipt> for ReceiptSummary {
    fn from(receipt: &TxReceipt) -> Self {
        Self {
            contract_address: receipt.contract_address.filter(|addr| !addr.is_zero()),
            result: receipt.result.clone(),
            used_gas: receipt.used_gas,
            failed: receipt.failed,
        }
    }
}

/// A transaction as stored in the index.
///
/// `idx` is assigned by the indexer, dense and increasing within a shard. It carries no meaning
/// across shards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender.
    pub from: Address,
    /// Recipient, `None` for contract creation.
    pub to: Option<Address>,
    /// Transferred amount.
    pub amount: u64,
    /// Fee paid, `gas_price * used_gas`.
    pub fee: u64,
    /// Timestamp, in seconds.
    pub timestamp: u64,
    /// Sender nonce.
    pub account_nonce: u64,
    /// Call data or contract code.
    pub payload: Bytes,
    /// Shard of the transaction.
    pub shard: ShardNumber,
    /// Height of the including block, `0` for pending transactions.
    pub block_height: u64,
    /// Per-shard sequence number.
    pub idx: u64,
    /// Whether this is a mempool entry.
    pub pending: bool,
    /// Receipt data, default when the receipt could not be fetched.
    pub receipt: ReceiptSummary,
}

/// A mempool transaction. Same shape as a mined one, with `pending` set.
pub type PendingTransaction = Transaction;

impl Transaction {
    /// Builds a mined transaction record.
    ///
    /// `block_timestamp` is used when the node did not report a transaction timestamp. With no
    /// receipt, gas, fee and contract address stay at their defaults.
    pub fn mined(
        tx: &ChainTransaction,
        shard: ShardNumber,
        block_height: u64,
        block_timestamp: u64,
        idx: u64,
        receipt: Option<&TxReceipt>,
    ) -> Self {
        let receipt = receipt.map(ReceiptSummary::from).unwrap_or_default();
        Self {
            hash: tx.hash,
            from: tx.from,
            to: tx.recipient(),
            amount: tx.amount,
            fee: tx.gas_price.saturating_mul(receipt.used_gas),
            timestamp: if tx.timestamp == 0 { block_timestamp } else { tx.timestamp },
            account_nonce: tx.account_nonce,
            payload: tx.payload.clone(),
            shard,
            block_height,
            idx,
            pending: false,
            receipt,
        }
    }

    /// Builds a pending transaction record.
    pub fn pending(tx: &ChainTransaction, shard: ShardNumber, idx: u64) -> PendingTransaction {
        Self {
            hash: tx.hash,
            from: tx.from,
            to: tx.recipient(),
            amount: tx.amount,
            fee: tx.gas_price.saturating_mul(tx.gas_limit),
            timestamp: tx.timestamp,
            account_nonce: tx.account_nonce,
            payload: tx.payload.clone(),
            shard,
            block_height: 0,
            idx,
            pending: true,
            receipt: ReceiptSummary::default(),
        }
    }

    /// Returns `true` when the transaction deploys a contract.
    pub const fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    /// The counterpart of the sender: the recipient, or the deployed contract for creation
    /// transactions.
    pub fn effective_to(&self) -> Option<Address> {
        self.to.or(self.receipt.contract_address)
    }
}

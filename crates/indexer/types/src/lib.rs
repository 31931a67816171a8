//! Core types shared across the shardex indexer components.
//!
//! This crate defines two families of types:
//! - chain types ([`ChainBlock`], [`ChainTransaction`], [`TxReceipt`], ...) which mirror what a
//!   chain node returns over JSON-RPC;
//! - index records ([`Block`], [`Transaction`], [`Account`], [`MinerAccount`], [`LastBlock`])
//!   which are what the indexer persists for downstream readers.

use alloy_primitives::Address;

mod chain;
pub use chain::{
    AccountBalance, ChainBlock, ChainDebt, ChainHead, ChainHeader, ChainTransaction, TxReceipt,
};

mod block;
pub use block::{Block, LastBlock, TxSummary};

mod transaction;
pub use transaction::{PendingTransaction, ReceiptSummary, Transaction};

mod account;
pub use account::{Account, AccountType, MinedBlockStats, MinerAccount};

/// Identifier of one shard of the chain.
pub type ShardNumber = u32;

/// The null (burn) address. Block reward transactions originate from it.
pub const NULL_ADDRESS: Address = Address::ZERO;

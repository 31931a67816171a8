//! JSON-RPC API of the chain node, as far as the indexer uses it.
//!
//! The node splits its API over three namespaces. The generated `*Client` traits are what
//! [`HttpChainClient`](crate::HttpChainClient) calls; the `*Server` traits exist so tests can
//! stand up a fake node.

use alloy_primitives::{Address, B256};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use shardex_types::{AccountBalance, ChainBlock, ChainHead, ChainTransaction, TxReceipt};

/// Chain state queries. Default namespace separator is `_`.
#[rpc(client, server, namespace = "seele")]
pub trait SeeleApi {
    /// Returns a summary of the node's head block.
    #[method(name = "getInfo")]
    async fn get_info(&self) -> RpcResult<ChainHead>;

    /// Returns the canonical block at `height`. With `full_tx` the transactions are returned as
    /// objects rather than hashes.
    #[method(name = "getBlockByHeight")]
    async fn get_block_by_height(&self, height: u64, full_tx: bool) -> RpcResult<ChainBlock>;

    /// Returns the balance of `account` at the block identified by `block_hash`, or at `height`
    /// when the hash is empty. A height of `-1` selects the head block.
    #[method(name = "getBalance")]
    async fn get_balance(
        &self,
        account: Address,
        block_hash: String,
        height: i64,
    ) -> RpcResult<AccountBalance>;
}

/// Transaction pool queries.
#[rpc(client, server, namespace = "txpool")]
pub trait TxPoolApi {
    /// Returns the receipt of a mined transaction. `abi` optionally decodes the result and is
    /// left empty by the indexer.
    #[method(name = "getReceiptByTxHash")]
    async fn get_receipt_by_tx_hash(&self, hash: B256, abi: String) -> RpcResult<TxReceipt>;
}

/// Node debugging endpoints.
#[rpc(client, server, namespace = "debug")]
pub trait DebugApi {
    /// Returns the transactions currently in the node's mempool.
    #[method(name = "getPendingTransactions")]
    async fn get_pending_transactions(&self) -> RpcResult<Vec<ChainTransaction>>;
}

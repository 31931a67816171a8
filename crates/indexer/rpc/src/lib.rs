//! Chain node client of the shardex indexer.
//!
//! [`ChainClient`] is the interface the sync engine consumes. [`HttpChainClient`] implements it
//! over the node's JSON-RPC API, defined in [`api`].

pub mod api;
pub use api::{
    DebugApiClient, DebugApiServer, SeeleApiClient, SeeleApiServer, TxPoolApiClient,
    TxPoolApiServer,
};

mod error;
pub use error::ChainClientError;

mod client;
pub use client::{ChainClient, HttpChainClient, HttpChainClientBuilder};

pub use jsonrpsee::core::ClientError;

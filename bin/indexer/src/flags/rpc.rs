//! Chain node client flags.

use clap::Args;
use shardex_rpc::{HttpChainClient, HttpChainClientBuilder};
use std::time::Duration;
use url::Url;

/// Settings of the JSON-RPC connections to the chain nodes.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub(crate) struct RpcArgs {
    /// Request timeout in seconds.
    #[arg(long = "rpc.timeout", env = "SHARDEX_RPC_TIMEOUT", default_value_t = 10)]
    pub(crate) timeout: u64,
    /// Retries of a request failing at the transport level.
    #[arg(long = "rpc.retries", env = "SHARDEX_RPC_RETRIES", default_value_t = 3)]
    pub(crate) retries: usize,
}

impl RpcArgs {
    /// Builds a client for the node at `url`.
    pub(crate) fn client(&self, url: Url) -> HttpChainClient {
        HttpChainClientBuilder::new(url)
            .timeout(Duration::from_secs(self.timeout))
            .retries(self.retries)
            .build()
    }
}

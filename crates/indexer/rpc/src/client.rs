//! The [`ChainClient`] interface and its HTTP implementation.

use crate::{ChainClientError, DebugApiClient, SeeleApiClient, TxPoolApiClient};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use jsonrpsee::{
    core::ClientError,
    http_client::{HttpClient, HttpClientBuilder},
};
use shardex_types::{ChainBlock, ChainHead, ChainTransaction, TxReceipt};
use std::{
    fmt::Debug,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tracing::{debug, warn};
use url::Url;

/// Default request timeout in milliseconds.
const DEFAULT_REQUEST_TIMEOUT: u64 = 10_000;

/// Default number of retries of a request failing with a transient error.
const DEFAULT_RETRIES: usize = 3;

/// Access to one shard's chain node.
///
/// Every syncer owns its own client. The trait exists so the sync engine can be driven by a
/// fake chain in tests.
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// Returns the node's head block.
    async fn current_block(&self) -> Result<ChainHead, ChainClientError>;

    /// Returns the canonical block at `height`, with full transaction objects when `full_tx`
    /// is set.
    async fn block_by_height(
        &self,
        height: u64,
        full_tx: bool,
    ) -> Result<ChainBlock, ChainClientError>;

    /// Returns the receipt of a mined transaction.
    async fn receipt_by_tx_hash(&self, hash: B256) -> Result<TxReceipt, ChainClientError>;

    /// Returns the balance of `address` at the head block.
    async fn balance(&self, address: Address) -> Result<u64, ChainClientError>;

    /// Returns the node's mempool.
    async fn pending_transactions(&self) -> Result<Vec<ChainTransaction>, ChainClientError>;
}

#[async_trait]
impl<T: ChainClient + ?Sized> ChainClient for Arc<T> {
    async fn current_block(&self) -> Result<ChainHead, ChainClientError> {
        (**self).current_block().await
    }

    async fn block_by_height(
        &self,
        height: u64,
        full_tx: bool,
    ) -> Result<ChainBlock, ChainClientError> {
        (**self).block_by_height(height, full_tx).await
    }

    async fn receipt_by_tx_hash(&self, hash: B256) -> Result<TxReceipt, ChainClientError> {
        (**self).receipt_by_tx_hash(hash).await
    }

    async fn balance(&self, address: Address) -> Result<u64, ChainClientError> {
        (**self).balance(address).await
    }

    async fn pending_transactions(&self) -> Result<Vec<ChainTransaction>, ChainClientError> {
        (**self).pending_transactions().await
    }
}

/// Builder for an [`HttpChainClient`].
#[derive(Debug, Clone)]
pub struct HttpChainClientBuilder {
    /// The node's JSON-RPC endpoint.
    pub url: Url,
    /// Timeout of a single request.
    pub timeout: Duration,
    /// Retries of a request failing with a transient error.
    pub retries: usize,
}

impl HttpChainClientBuilder {
    /// Creates a builder for the node at `url` with default timeout and retries.
    pub const fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT),
            retries: DEFAULT_RETRIES,
        }
    }

    /// Parses `url` and creates a builder for it.
    pub fn parse(url: &str) -> Result<Self, ChainClientError> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Sets the request timeout.
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of retries of transient failures.
    pub const fn retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Builds the client. The connection itself is established on first use.
    pub fn build(self) -> HttpChainClient {
        HttpChainClient {
            url: self.url,
            timeout: self.timeout,
            retries: self.retries,
            connection: Mutex::new(None),
        }
    }
}

/// [`ChainClient`] talking JSON-RPC over HTTP.
///
/// The client holds at most one connection. A request borrows it for its duration; a transient
/// failure drops it so the next attempt builds a fresh one, and the request is retried with
/// exponential backoff.
#[derive(Debug)]
pub struct HttpChainClient {
    url: Url,
    timeout: Duration,
    retries: usize,
    connection: Mutex<Option<Arc<HttpClient>>>,
}

impl HttpChainClient {
    /// Returns the endpoint of the node.
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the current connection, building it if there is none.
    fn connection(&self) -> Result<Arc<HttpClient>, ChainClientError> {
        let mut slot = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }

        let client = HttpClientBuilder::default()
            .request_timeout(self.timeout)
            .build(self.url.as_str())
            .map_err(|err| ChainClientError::Build(err.to_string()))?;
        let client = Arc::new(client);
        debug!(target: "rpc", url = %self.url, "Connected to chain node");

        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Drops the current connection.
    fn reset(&self) {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Runs `call` against the current connection, retrying transient failures.
    async fn request<T, F, Fut>(&self, method: &'static str, call: F) -> Result<T, ChainClientError>
    where
        F: Fn(Arc<HttpClient>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let call = &call;
        let attempt = || async move {
            let client = self.connection()?;
            call(client).await.map_err(|err| {
                let err = ChainClientError::from(err);
                if err.is_transient() {
                    self.reset();
                }
                err
            })
        };

        attempt
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(100))
                    .with_max_delay(Duration::from_secs(5))
                    .with_max_times(self.retries),
            )
            .when(ChainClientError::is_transient)
            .notify(|err, delay| {
                warn!(
                    target: "rpc",
                    url = %self.url,
                    method,
                    %err,
                    ?delay,
                    "Chain node request failed, retrying"
                );
            })
            .await
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn current_block(&self) -> Result<ChainHead, ChainClientError> {
        self.request("seele_getInfo", |client| async move { client.get_info().await }).await
    }

    async fn block_by_height(
        &self,
        height: u64,
        full_tx: bool,
    ) -> Result<ChainBlock, ChainClientError> {
        self.request("seele_getBlockByHeight", |client| async move {
            client.get_block_by_height(height, full_tx).await
        })
        .await
    }

    async fn receipt_by_tx_hash(&self, hash: B256) -> Result<TxReceipt, ChainClientError> {
        self.request("txpool_getReceiptByTxHash", |client| async move {
            client.get_receipt_by_tx_hash(hash, String::new()).await
        })
        .await
    }

    async fn balance(&self, address: Address) -> Result<u64, ChainClientError> {
        let response = self
            .request("seele_getBalance", |client| async move {
                client.get_balance(address, String::new(), -1).await
            })
            .await?;
        Ok(response.balance)
    }

    async fn pending_transactions(&self) -> Result<Vec<ChainTransaction>, ChainClientError> {
        self.request("debug_getPendingTransactions", |client| async move {
            client.get_pending_transactions().await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DebugApiServer, SeeleApiServer, TxPoolApiServer};
    use jsonrpsee::{
        core::RpcResult,
        server::{Server, ServerHandle},
        types::ErrorObjectOwned,
    };
    use shardex_types::{AccountBalance, ChainHeader};
    use std::net::TcpListener;

    #[derive(Debug, Clone)]
    struct FakeNode;

    fn block(height: u64) -> ChainBlock {
        ChainBlock {
            hash: B256::repeat_byte(height as u8),
            header: ChainHeader { height, create_timestamp: 1_000 + height, ..Default::default() },
            transactions: vec![ChainTransaction {
                hash: B256::repeat_byte(0xee),
                amount: 5,
                ..Default::default()
            }],
            debts: Vec::new(),
        }
    }

    #[async_trait]
    impl SeeleApiServer for FakeNode {
        async fn get_info(&self) -> RpcResult<ChainHead> {
            Ok(ChainHead { height: 7, hash: B256::repeat_byte(7), ..Default::default() })
        }

        async fn get_block_by_height(&self, height: u64, _full_tx: bool) -> RpcResult<ChainBlock> {
            if height > 7 {
                return Err(ErrorObjectOwned::owned(-32000, "block not found", None::<()>));
            }
            Ok(block(height))
        }

        async fn get_balance(
            &self,
            account: Address,
            _block_hash: String,
            height: i64,
        ) -> RpcResult<AccountBalance> {
            assert_eq!(height, -1);
            Ok(AccountBalance { account, balance: 1_234 })
        }
    }

    #[async_trait]
    impl TxPoolApiServer for FakeNode {
        async fn get_receipt_by_tx_hash(&self, _hash: B256, _abi: String) -> RpcResult<TxReceipt> {
            Ok(TxReceipt { used_gas: 21_000, ..Default::default() })
        }
    }

    #[async_trait]
    impl DebugApiServer for FakeNode {
        async fn get_pending_transactions(&self) -> RpcResult<Vec<ChainTransaction>> {
            Ok(vec![ChainTransaction::default(); 2])
        }
    }

    async fn spawn_node() -> (Url, ServerHandle) {
        let server = Server::builder().build("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut module = SeeleApiServer::into_rpc(FakeNode);
        module.merge(TxPoolApiServer::into_rpc(FakeNode)).unwrap();
        module.merge(DebugApiServer::into_rpc(FakeNode)).unwrap();

        let handle = server.start(module);
        (Url::parse(&format!("http://{addr}")).unwrap(), handle)
    }

    #[tokio::test]
    async fn test_requests_against_node() {
        let (url, _handle) = spawn_node().await;
        let client = HttpChainClientBuilder::new(url).build();

        assert_eq!(client.current_block().await.unwrap().height, 7);
        assert_eq!(client.block_by_height(3, true).await.unwrap(), block(3));
        assert_eq!(client.receipt_by_tx_hash(B256::ZERO).await.unwrap().used_gas, 21_000);
        assert_eq!(client.balance(Address::repeat_byte(1)).await.unwrap(), 1_234);
        assert_eq!(client.pending_transactions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_error_object_is_not_retried() {
        let (url, _handle) = spawn_node().await;
        let client = HttpChainClientBuilder::new(url).retries(5).build();

        let err = client.block_by_height(100, true).await.unwrap_err();
        assert!(matches!(err, ChainClientError::Rpc(ClientError::Call(_))));
        assert!(!err.is_transient());
        // the connection survives a rejected request
        assert!(client.connection.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unreachable_node_drops_connection() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let url = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        let client = HttpChainClientBuilder::new(url)
            .timeout(Duration::from_millis(500))
            .retries(1)
            .build();

        let err = client.current_block().await.unwrap_err();
        assert!(err.is_transient());
        assert!(client.connection.lock().unwrap().is_none());
    }

    #[test]
    fn test_parse_rejects_invalid_url() {
        assert!(matches!(
            HttpChainClientBuilder::parse("not a url"),
            Err(ChainClientError::InvalidUrl(_))
        ));
    }
}

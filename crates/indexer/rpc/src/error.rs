use jsonrpsee::core::ClientError;
use thiserror::Error;

/// An error returned by a [`ChainClient`](crate::ChainClient).
#[derive(Debug, Error)]
pub enum ChainClientError {
    /// The node or the transport rejected the request.
    #[error("RPC error: {0}")]
    Rpc(#[from] ClientError),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(String),

    /// The configured endpoint is not a valid URL.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ChainClientError {
    /// Returns `true` for failures of the connection rather than of the request itself.
    ///
    /// Transient failures invalidate the current connection and are retried. Error objects
    /// returned by the node and undecodable responses are not.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Rpc(
                ClientError::Transport(_) |
                    ClientError::RequestTimeout |
                    ClientError::RestartNeeded(_)
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::types::ErrorObjectOwned;

    #[test]
    fn test_transient_classification() {
        assert!(ChainClientError::Rpc(ClientError::RequestTimeout).is_transient());
        assert!(ChainClientError::Rpc(ClientError::Transport("refused".into())).is_transient());

        let call = ErrorObjectOwned::owned(-32000, "block not found", None::<()>);
        assert!(!ChainClientError::Rpc(ClientError::Call(call)).is_transient());
        assert!(!ChainClientError::Build("bad".to_string()).is_transient());
    }
}

//! Shard endpoint flag.

use shardex_types::ShardNumber;
use std::{fmt, str::FromStr};
use thiserror::Error;
use url::Url;

/// A shard to index and the node serving it, given as `<shard>=<url>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShardEndpoint {
    /// The shard number.
    pub(crate) shard: ShardNumber,
    /// JSON-RPC endpoint of a node of that shard.
    pub(crate) url: Url,
}

/// Errors parsing a [`ShardEndpoint`].
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ShardEndpointError {
    /// The `=` separator is missing.
    #[error("expected <shard>=<url>, got `{0}`")]
    MissingSeparator(String),
    /// The shard is not a number.
    #[error("invalid shard number `{0}`")]
    InvalidShard(String),
    /// The url does not parse.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl FromStr for ShardEndpoint {
    type Err = ShardEndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (shard, url) =
            s.split_once('=').ok_or_else(|| ShardEndpointError::MissingSeparator(s.to_string()))?;
        let shard = shard
            .trim()
            .parse()
            .map_err(|_| ShardEndpointError::InvalidShard(shard.to_string()))?;
        Ok(Self { shard, url: url.trim().parse()? })
    }
}

impl fmt::Display for ShardEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.shard, self.url)
    }
}

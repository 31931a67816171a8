//! Command line flags.

mod rpc;
pub(crate) use rpc::RpcArgs;

mod shard;
pub(crate) use shard::ShardEndpoint;

mod sync;
pub(crate) use sync::SyncArgs;

//! Synchronization engine of the shardex indexer.
//!
//! One [`SyncOrchestrator`] per shard mirrors the chain into an [`IndexStore`]. Each cycle it
//! resolves reorganizations with the [`ReorgResolver`], indexes new blocks with the
//! [`BlockIngester`], refreshes touched accounts with the [`AccountProjector`] and snapshots the
//! mempool with the [`PendingPoolMirror`]. Fan-out work runs on a bounded [`WorkerPool`].
//!
//! [`IndexStore`]: shardex_storage::IndexStore

mod config;
pub use config::{
    DEFAULT_FLUSH_THRESHOLD, DEFAULT_SYNC_INTERVAL, DEFAULT_WORKER_COUNT, SyncConfig,
};

mod error;
pub use error::SyncError;

mod metrics;
pub use metrics::Metrics;

mod pool;
pub use pool::{TaskBatch, WorkerPool};

mod projector;
pub use projector::{AccountProjector, ProjectionReport, TouchedAccount, TouchedAccounts};

mod ingest;
pub use ingest::{BlockIngester, IngestOutcome};

mod reorg;
pub use reorg::ReorgResolver;

mod pending;
pub use pending::PendingPoolMirror;

mod orchestrator;
pub use orchestrator::{CycleReport, SyncOrchestrator, SyncState};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

//! SQLite implementation of the storage traits.
//!
//! Reads go through a small r2d2 pool of connections, writes through one dedicated writer
//! connection. The database runs in WAL mode so readers never block the writer.

use crate::StorageError;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::{
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tracing::info;

mod codec;

mod account;
mod block;
mod pending;
mod transaction;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS blocks (
    shard INTEGER NOT NULL,
    height INTEGER NOT NULL,
    hash BLOB NOT NULL,
    parent_hash BLOB NOT NULL,
    timestamp INTEGER NOT NULL,
    difficulty INTEGER NOT NULL,
    creator BLOB NOT NULL,
    used_gas INTEGER NOT NULL,
    debt_count INTEGER NOT NULL,
    tx_count INTEGER NOT NULL,
    transactions BLOB NOT NULL,
    debt_accounts BLOB NOT NULL,
    PRIMARY KEY (shard, height)
);
CREATE INDEX IF NOT EXISTS idx_blocks_creator ON blocks(shard, creator);

CREATE TABLE IF NOT EXISTS transactions (
    shard INTEGER NOT NULL,
    hash BLOB NOT NULL,
    from_addr BLOB NOT NULL,
    to_addr BLOB,
    effective_to BLOB,
    amount INTEGER NOT NULL,
    fee INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    account_nonce INTEGER NOT NULL,
    payload BLOB NOT NULL,
    block_height INTEGER NOT NULL,
    idx INTEGER NOT NULL,
    contract_address BLOB,
    result BLOB NOT NULL,
    used_gas INTEGER NOT NULL,
    failed INTEGER NOT NULL,
    PRIMARY KEY (shard, hash)
);
CREATE INDEX IF NOT EXISTS idx_tx_height ON transactions(shard, block_height);
CREATE INDEX IF NOT EXISTS idx_tx_from ON transactions(shard, from_addr);
CREATE INDEX IF NOT EXISTS idx_tx_to ON transactions(shard, effective_to);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tx_idx ON transactions(shard, idx);

CREATE TABLE IF NOT EXISTS pending_transactions (
    shard INTEGER NOT NULL,
    hash BLOB NOT NULL,
    from_addr BLOB NOT NULL,
    to_addr BLOB,
    effective_to BLOB,
    amount INTEGER NOT NULL,
    fee INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    account_nonce INTEGER NOT NULL,
    payload BLOB NOT NULL,
    block_height INTEGER NOT NULL,
    idx INTEGER NOT NULL,
    contract_address BLOB,
    result BLOB NOT NULL,
    used_gas INTEGER NOT NULL,
    failed INTEGER NOT NULL,
    PRIMARY KEY (shard, hash)
);

CREATE TABLE IF NOT EXISTS accounts (
    address BLOB PRIMARY KEY,
    shard INTEGER NOT NULL,
    account_type INTEGER NOT NULL,
    balance INTEGER NOT NULL,
    tx_count INTEGER NOT NULL,
    mined_blocks INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS miner_accounts (
    address BLOB PRIMARY KEY,
    shard INTEGER NOT NULL,
    mined_blocks INTEGER NOT NULL,
    reward INTEGER NOT NULL,
    fee INTEGER NOT NULL,
    revenue INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS last_blocks (
    shard INTEGER NOT NULL,
    slot INTEGER NOT NULL,
    height INTEGER NOT NULL,
    hash BLOB NOT NULL,
    timestamp INTEGER NOT NULL,
    tx_count INTEGER NOT NULL,
    PRIMARY KEY (shard, slot)
);
";

/// Index store backed by SQLite.
///
/// Each shard syncer owns its own `SqliteStore`; several stores may point at the same database
/// file. Only one syncer may write a given shard at a time. Sequence numbers are assigned by
/// reading the shard's transaction count, which is not guarded against concurrent writers.
pub struct SqliteStore {
    /// Connection pool for read operations.
    read_pool: Pool<SqliteConnectionManager>,
    /// Dedicated connection for write operations.
    writer: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("read_pool", &self.read_pool.state()).finish()
    }
}

fn configure_connection(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;",
    )
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let writer = Connection::open(path)?;
        configure_connection(&writer)?;

        let manager =
            SqliteConnectionManager::file(path).with_init(|conn| configure_connection(conn));
        let read_pool = Pool::builder().max_size(4).build(manager)?;

        let store = Self { read_pool, writer: Mutex::new(writer) };
        store.init_schema()?;
        info!(target: "storage", path = %path.display(), "Opened index database");
        Ok(store)
    }

    /// Creates a private in-memory database.
    ///
    /// All connections of the store share one named in-memory database, which lives as long as
    /// the store.
    pub fn in_memory() -> Result<Self, StorageError> {
        let uri = format!("file:shardex_{}?mode=memory&cache=shared", unique_id());
        let writer = Connection::open(&uri)?;
        configure_connection(&writer)?;

        let manager =
            SqliteConnectionManager::file(&uri).with_init(|conn| configure_connection(conn));
        let read_pool = Pool::builder().max_size(2).build(manager)?;

        let store = Self { read_pool, writer: Mutex::new(writer) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.writer().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Gets a read connection from the pool.
    fn reader(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        Ok(self.read_pool.get()?)
    }

    /// Locks the writer connection.
    ///
    /// A poisoned lock only means another writer panicked mid-call; SQLite already rolled back
    /// whatever that call left uncommitted, so the connection stays usable.
    fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Generates a unique id for in-memory shared-cache databases.
fn unique_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let pid = u64::from(std::process::id());
    (pid << 32) | COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockStorage;

    #[test]
    fn test_in_memory_stores_are_isolated() {
        let a = SqliteStore::in_memory().unwrap();
        let b = SqliteStore::in_memory().unwrap();

        a.add_block(&shardex_types::Block { shard: 1, height: 0, ..Default::default() }).unwrap();

        assert_eq!(a.block_height(1).unwrap(), 1);
        assert_eq!(b.block_height(1).unwrap(), 0);
    }

    #[test]
    fn test_open_on_disk_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .add_block(&shardex_types::Block { shard: 3, height: 0, ..Default::default() })
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.block_height(3).unwrap(), 1);
    }
}

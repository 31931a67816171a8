//! Storage layer of the shardex indexer.
//!
//! The sync engine depends on the traits defined here; [`SqliteStore`] implements all of them on
//! top of a SQLite database whose tables are the read contract for downstream services.

mod error;
pub use error::StorageError;

mod traits;
pub use traits::{
    AccountStorage, BlockStorage, IndexStore, LastBlockStorage, PendingTxStorage,
    TransactionStorage,
};

mod sqlite;
pub use sqlite::SqliteStore;

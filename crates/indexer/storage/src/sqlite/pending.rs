use super::{
    SqliteStore,
    codec::{TX_COLUMNS, insert_transaction, row_to_transaction},
};
use crate::{PendingTxStorage, StorageError};
use rusqlite::params;
use shardex_types::{PendingTransaction, ShardNumber};

impl PendingTxStorage for SqliteStore {
    fn remove_all_pending_txs(&self, shard: ShardNumber) -> Result<(), StorageError> {
        self.writer()
            .execute("DELETE FROM pending_transactions WHERE shard = ?", params![shard])?;
        Ok(())
    }

    fn add_pending_tx(&self, tx: &PendingTransaction) -> Result<(), StorageError> {
        insert_transaction(&self.writer(), "pending_transactions", tx)
    }

    fn add_pending_txs(&self, txs: &[PendingTransaction]) -> Result<(), StorageError> {
        if txs.is_empty() {
            return Ok(());
        }
        let mut conn = self.writer();
        let db_tx = conn.transaction()?;
        for tx in txs {
            insert_transaction(&db_tx, "pending_transactions", tx)?;
        }
        db_tx.commit()?;
        Ok(())
    }

    fn replace_pending_txs(
        &self,
        shard: ShardNumber,
        txs: &[PendingTransaction],
    ) -> Result<(), StorageError> {
        let mut conn = self.writer();
        let db_tx = conn.transaction()?;
        db_tx.execute("DELETE FROM pending_transactions WHERE shard = ?", params![shard])?;
        for tx in txs {
            insert_transaction(&db_tx, "pending_transactions", tx)?;
        }
        db_tx.commit()?;
        Ok(())
    }

    fn get_pending_txs(&self, shard: ShardNumber) -> Result<Vec<PendingTransaction>, StorageError> {
        let conn = self.reader()?;
        let sql =
            format!("SELECT {TX_COLUMNS} FROM pending_transactions WHERE shard = ? ORDER BY idx");
        let mut stmt = conn.prepare(&sql)?;
        let txs = stmt
            .query_map(params![shard], |row| row_to_transaction(row, true))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(txs)
    }
}

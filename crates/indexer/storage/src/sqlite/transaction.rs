use super::{
    SqliteStore,
    codec::{TX_COLUMNS, insert_transaction, optional, row_to_transaction},
};
use crate::{StorageError, TransactionStorage};
use alloy_primitives::{Address, B256};
use rusqlite::params;
use shardex_types::{ShardNumber, Transaction};

impl TransactionStorage for SqliteStore {
    fn add_tx(&self, tx: &Transaction) -> Result<(), StorageError> {
        insert_transaction(&self.writer(), "transactions", tx)
    }

    fn add_txs(&self, txs: &[Transaction]) -> Result<(), StorageError> {
        if txs.is_empty() {
            return Ok(());
        }
        let mut conn = self.writer();
        let db_tx = conn.transaction()?;
        for tx in txs {
            insert_transaction(&db_tx, "transactions", tx)?;
        }
        db_tx.commit()?;
        Ok(())
    }

    fn remove_txs(&self, shard: ShardNumber, height: u64) -> Result<(), StorageError> {
        self.writer().execute(
            "DELETE FROM transactions WHERE shard = ? AND block_height = ?",
            params![shard, height as i64],
        )?;
        Ok(())
    }

    fn get_txs_by_height(
        &self,
        shard: ShardNumber,
        height: u64,
    ) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.reader()?;
        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE shard = ? AND block_height = ? ORDER BY idx"
        );
        let mut stmt = conn.prepare(&sql)?;
        let txs = stmt
            .query_map(params![shard, height as i64], |row| row_to_transaction(row, false))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(txs)
    }

    fn get_tx_by_hash(
        &self,
        shard: ShardNumber,
        hash: B256,
    ) -> Result<Option<Transaction>, StorageError> {
        let sql = format!("SELECT {TX_COLUMNS} FROM transactions WHERE shard = ? AND hash = ?");
        optional(self.reader()?.query_row(&sql, params![shard, hash.as_slice()], |row| {
            row_to_transaction(row, false)
        }))
    }

    fn tx_count_by_shard(&self, shard: ShardNumber) -> Result<u64, StorageError> {
        let count: i64 = self.reader()?.query_row(
            "SELECT COUNT(*) FROM transactions WHERE shard = ?",
            params![shard],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn tx_count_by_height(&self, shard: ShardNumber, height: u64) -> Result<u64, StorageError> {
        let count: i64 = self.reader()?.query_row(
            "SELECT COUNT(*) FROM transactions WHERE shard = ? AND block_height = ?",
            params![shard, height as i64],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn tx_count_by_address(
        &self,
        shard: ShardNumber,
        address: Address,
    ) -> Result<u64, StorageError> {
        let count: i64 = self.reader()?.query_row(
            "SELECT COUNT(*) FROM transactions
             WHERE shard = ?1 AND (from_addr = ?2 OR effective_to = ?2)",
            params![shard, address.as_slice()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

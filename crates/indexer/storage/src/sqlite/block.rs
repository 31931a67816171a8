use super::{
    SqliteStore,
    codec::{address_from_row, b256_from_row, conflict_or, optional, u64_from_row},
};
use crate::{BlockStorage, LastBlockStorage, StorageError};
use alloy_primitives::Address;
use rusqlite::{Row, params};
use shardex_types::{Block, LastBlock, MinedBlockStats, NULL_ADDRESS, ShardNumber, TxSummary};
use tracing::debug;

const BLOCK_COLUMNS: &str = "shard, height, hash, parent_hash, timestamp, difficulty, creator, \
     used_gas, debt_count, transactions, debt_accounts";

impl SqliteStore {
    /// Maps a row to a block whose JSON columns are returned undecoded.
    fn row_to_block(row: &Row<'_>) -> rusqlite::Result<(Block, Vec<u8>, Vec<u8>)> {
        let hash: Vec<u8> = row.get(2)?;
        let parent_hash: Vec<u8> = row.get(3)?;
        let creator: Vec<u8> = row.get(6)?;
        let transactions: Vec<u8> = row.get(9)?;
        let debt_accounts: Vec<u8> = row.get(10)?;

        let block = Block {
            shard: row.get(0)?,
            height: u64_from_row(row, 1)?,
            hash: b256_from_row(&hash, 2)?,
            parent_hash: b256_from_row(&parent_hash, 3)?,
            timestamp: u64_from_row(row, 4)?,
            difficulty: u64_from_row(row, 5)?,
            creator: address_from_row(&creator, 6)?,
            used_gas: u64_from_row(row, 7)?,
            debt_accounts: Vec::new(),
            transactions: Vec::new(),
        };
        Ok((block, transactions, debt_accounts))
    }

    fn write_block(&self, block: &Block, replace: bool) -> Result<(), StorageError> {
        let summaries = serde_json::to_vec(&block.transactions)?;
        let debt_accounts = serde_json::to_vec(&block.debt_accounts)?;
        let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
        let sql = format!(
            "{verb} INTO blocks ({BLOCK_COLUMNS}, tx_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );

        self.writer()
            .execute(
                &sql,
                params![
                    block.shard,
                    block.height as i64,
                    block.hash.as_slice(),
                    block.parent_hash.as_slice(),
                    block.timestamp as i64,
                    block.difficulty as i64,
                    block.creator.as_slice(),
                    block.used_gas as i64,
                    block.debt_accounts.len() as i64,
                    summaries,
                    debt_accounts,
                    block.transactions.len() as i64,
                ],
            )
            .map_err(|err| {
                conflict_or(err, || format!("block {} on shard {}", block.height, block.shard))
            })?;
        Ok(())
    }
}

impl BlockStorage for SqliteStore {
    fn block_height(&self, shard: ShardNumber) -> Result<u64, StorageError> {
        let max: Option<i64> = self.reader()?.query_row(
            "SELECT MAX(height) FROM blocks WHERE shard = ?",
            params![shard],
            |row| row.get(0),
        )?;
        Ok(max.map_or(0, |height| height as u64 + 1))
    }

    fn add_block(&self, block: &Block) -> Result<(), StorageError> {
        self.write_block(block, false)?;
        debug!(target: "storage", shard = block.shard, height = block.height, "Stored block");
        Ok(())
    }

    fn update_block(&self, block: &Block) -> Result<(), StorageError> {
        self.write_block(block, true)
    }

    fn remove_block(&self, shard: ShardNumber, height: u64) -> Result<(), StorageError> {
        self.writer().execute(
            "DELETE FROM blocks WHERE shard = ? AND height = ?",
            params![shard, height as i64],
        )?;
        Ok(())
    }

    fn get_block_by_height(
        &self,
        shard: ShardNumber,
        height: u64,
    ) -> Result<Option<Block>, StorageError> {
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE shard = ? AND height = ?");
        let row = optional(self.reader()?.query_row(
            &sql,
            params![shard, height as i64],
            Self::row_to_block,
        ))?;

        row.map(|(mut block, summaries, debt_accounts)| {
            block.transactions = serde_json::from_slice::<Vec<TxSummary>>(&summaries)?;
            block.debt_accounts = serde_json::from_slice::<Vec<Address>>(&debt_accounts)?;
            Ok(block)
        })
        .transpose()
    }

    fn mined_blocks_count(
        &self,
        shard: ShardNumber,
        address: Address,
    ) -> Result<u64, StorageError> {
        let count: i64 = self.reader()?.query_row(
            "SELECT COUNT(*) FROM blocks WHERE shard = ? AND creator = ?",
            params![shard, address.as_slice()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn mined_block_stats(
        &self,
        shard: ShardNumber,
        address: Address,
    ) -> Result<MinedBlockStats, StorageError> {
        let conn = self.reader()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE shard = ? AND creator = ?",
            params![shard, address.as_slice()],
            |row| row.get(0),
        )?;

        let fee: i64 = conn.query_row(
            "SELECT COALESCE(SUM(t.fee), 0)
             FROM transactions t
             JOIN blocks b ON b.shard = t.shard AND b.height = t.block_height
             WHERE b.shard = ? AND b.creator = ?",
            params![shard, address.as_slice()],
            |row| row.get(0),
        )?;

        // Block rewards are transfers from the null address to the miner.
        let reward: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0)
             FROM transactions
             WHERE shard = ? AND from_addr = ? AND to_addr = ?",
            params![shard, NULL_ADDRESS.as_slice(), address.as_slice()],
            |row| row.get(0),
        )?;

        Ok(MinedBlockStats { count: count as u64, reward: reward as u64, fee: fee as u64 })
    }
}

impl LastBlockStorage for SqliteStore {
    fn get_last_blocks(&self, shard: ShardNumber) -> Result<Vec<LastBlock>, StorageError> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT shard, slot, height, hash, timestamp, tx_count
             FROM last_blocks WHERE shard = ? ORDER BY slot",
        )?;

        let markers = stmt
            .query_map(params![shard], |row| {
                let hash: Vec<u8> = row.get(3)?;
                Ok(LastBlock {
                    shard: row.get(0)?,
                    slot: row.get(1)?,
                    height: u64_from_row(row, 2)?,
                    hash: b256_from_row(&hash, 3)?,
                    timestamp: u64_from_row(row, 4)?,
                    tx_count: u64_from_row(row, 5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(markers)
    }

    fn add_last_blocks(&self, markers: &[LastBlock]) -> Result<(), StorageError> {
        let mut conn = self.writer();
        let tx = conn.transaction()?;
        for marker in markers {
            tx.execute(
                "INSERT INTO last_blocks (shard, slot, height, hash, timestamp, tx_count)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    marker.shard,
                    marker.slot,
                    marker.height as i64,
                    marker.hash.as_slice(),
                    marker.timestamp as i64,
                    marker.tx_count as i64,
                ],
            )
            .map_err(|err| {
                conflict_or(err, || {
                    format!("last block slot {} on shard {}", marker.slot, marker.shard)
                })
            })?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update_last_block(&self, marker: &LastBlock) -> Result<(), StorageError> {
        let updated = self.writer().execute(
            "UPDATE last_blocks SET height = ?, hash = ?, timestamp = ?, tx_count = ?
             WHERE shard = ? AND slot = ?",
            params![
                marker.height as i64,
                marker.hash.as_slice(),
                marker.timestamp as i64,
                marker.tx_count as i64,
                marker.shard,
                marker.slot,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::EntryNotFound(format!(
                "last block slot {} on shard {}",
                marker.slot, marker.shard
            )));
        }
        Ok(())
    }

    fn remove_last_blocks_by_shard(&self, shard: ShardNumber) -> Result<(), StorageError> {
        self.writer().execute("DELETE FROM last_blocks WHERE shard = ?", params![shard])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransactionStorage;
    use alloy_primitives::B256;
    use shardex_types::Transaction;

    fn block(shard: ShardNumber, height: u64, creator: Address) -> Block {
        Block {
            shard,
            height,
            hash: B256::repeat_byte(height as u8 + 1),
            creator,
            timestamp: 1_000 + height * 10,
            transactions: vec![TxSummary { hash: B256::repeat_byte(0xee), ..Default::default() }],
            debt_accounts: vec![Address::repeat_byte(0xdd)],
            ..Default::default()
        }
    }

    #[test]
    fn test_block_height_is_next_height() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.block_height(1).unwrap(), 0);

        store.add_block(&block(1, 0, Address::ZERO)).unwrap();
        store.add_block(&block(1, 1, Address::ZERO)).unwrap();
        store.add_block(&block(2, 0, Address::ZERO)).unwrap();

        assert_eq!(store.block_height(1).unwrap(), 2);
        assert_eq!(store.block_height(2).unwrap(), 1);
    }

    #[test]
    fn test_add_block_twice_conflicts() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_block(&block(1, 0, Address::ZERO)).unwrap();

        let err = store.add_block(&block(1, 0, Address::ZERO)).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[test]
    fn test_get_update_remove_block() {
        let store = SqliteStore::in_memory().unwrap();
        let mut stored = block(1, 4, Address::repeat_byte(7));
        store.add_block(&stored).unwrap();

        assert_eq!(store.get_block_by_height(1, 4).unwrap(), Some(stored.clone()));

        stored.hash = B256::repeat_byte(0x42);
        store.update_block(&stored).unwrap();
        assert_eq!(store.get_block_by_height(1, 4).unwrap().unwrap().hash, stored.hash);

        store.remove_block(1, 4).unwrap();
        assert_eq!(store.get_block_by_height(1, 4).unwrap(), None);
        // removing again is a no-op
        store.remove_block(1, 4).unwrap();
    }

    #[test]
    fn test_mined_block_stats() {
        let store = SqliteStore::in_memory().unwrap();
        let miner = Address::repeat_byte(0xaa);
        let other = Address::repeat_byte(0xbb);

        store.add_block(&block(1, 0, miner)).unwrap();
        store.add_block(&block(1, 1, other)).unwrap();
        store.add_block(&block(1, 2, miner)).unwrap();

        let reward = |height: u64, to: Address, idx: u64| Transaction {
            hash: B256::repeat_byte(0x10 + idx as u8),
            from: NULL_ADDRESS,
            to: Some(to),
            amount: 50,
            shard: 1,
            block_height: height,
            idx,
            ..Default::default()
        };
        let transfer = |height: u64, idx: u64| Transaction {
            hash: B256::repeat_byte(0x20 + idx as u8),
            from: other,
            to: Some(Address::repeat_byte(0xcc)),
            amount: 1,
            fee: 3,
            shard: 1,
            block_height: height,
            idx,
            ..Default::default()
        };
        store
            .add_txs(&[
                reward(0, miner, 1),
                transfer(0, 2),
                reward(1, other, 3),
                transfer(1, 4),
                reward(2, miner, 5),
                transfer(2, 6),
            ])
            .unwrap();

        let stats = store.mined_block_stats(1, miner).unwrap();
        assert_eq!(stats, MinedBlockStats { count: 2, reward: 100, fee: 6 });
        assert_eq!(store.mined_blocks_count(1, miner).unwrap(), 2);
        assert_eq!(store.mined_block_stats(2, miner).unwrap(), MinedBlockStats::default());
    }

    #[test]
    fn test_last_block_slots() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_last_blocks(1).unwrap().is_empty());

        let first = LastBlock::new(&block(1, 0, Address::ZERO), 0);
        let second = LastBlock::new(&block(1, 0, Address::ZERO), 1);
        store.add_last_blocks(&[first, second]).unwrap();

        let newer = LastBlock::new(&block(1, 1, Address::ZERO), 1);
        store.update_last_block(&newer).unwrap();

        let markers = store.get_last_blocks(1).unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].height, 0);
        assert_eq!(markers[1], newer);

        store.remove_last_blocks_by_shard(1).unwrap();
        assert!(store.get_last_blocks(1).unwrap().is_empty());
        assert!(matches!(
            store.update_last_block(&newer).unwrap_err(),
            StorageError::EntryNotFound(_)
        ));
    }
}

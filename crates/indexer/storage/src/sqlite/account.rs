use super::{
    SqliteStore,
    codec::{address_from_row, conflict_or, optional, u64_from_row},
};
use crate::{AccountStorage, StorageError};
use alloy_primitives::Address;
use rusqlite::params;
use shardex_types::{Account, AccountType, MinerAccount};

impl AccountStorage for SqliteStore {
    fn get_account(&self, address: Address) -> Result<Option<Account>, StorageError> {
        optional(self.reader()?.query_row(
            "SELECT address, shard, account_type, balance, tx_count, mined_blocks, updated_at
             FROM accounts WHERE address = ?",
            params![address.as_slice()],
            |row| {
                let address: Vec<u8> = row.get(0)?;
                Ok(Account {
                    address: address_from_row(&address, 0)?,
                    shard: row.get(1)?,
                    account_type: AccountType::from_code(row.get(2)?),
                    balance: u64_from_row(row, 3)?,
                    tx_count: u64_from_row(row, 4)?,
                    mined_blocks: u64_from_row(row, 5)?,
                    updated_at: u64_from_row(row, 6)?,
                })
            },
        ))
    }

    fn add_account(&self, account: &Account) -> Result<(), StorageError> {
        self.writer()
            .execute(
                "INSERT INTO accounts
                 (address, shard, account_type, balance, tx_count, mined_blocks, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    account.address.as_slice(),
                    account.shard,
                    account.account_type.code(),
                    account.balance as i64,
                    account.tx_count as i64,
                    account.mined_blocks as i64,
                    account.updated_at as i64,
                ],
            )
            .map_err(|err| conflict_or(err, || format!("account {}", account.address)))?;
        Ok(())
    }

    fn update_account(&self, account: &Account) -> Result<(), StorageError> {
        let updated = self.writer().execute(
            "UPDATE accounts
             SET shard = ?, account_type = ?, balance = ?, tx_count = ?, mined_blocks = ?,
                 updated_at = ?
             WHERE address = ?",
            params![
                account.shard,
                account.account_type.code(),
                account.balance as i64,
                account.tx_count as i64,
                account.mined_blocks as i64,
                account.updated_at as i64,
                account.address.as_slice(),
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::EntryNotFound(format!("account {}", account.address)));
        }
        Ok(())
    }

    fn update_account_mined_blocks(
        &self,
        address: Address,
        mined_blocks: u64,
    ) -> Result<(), StorageError> {
        let updated = self.writer().execute(
            "UPDATE accounts SET mined_blocks = ? WHERE address = ?",
            params![mined_blocks as i64, address.as_slice()],
        )?;
        if updated == 0 {
            return Err(StorageError::EntryNotFound(format!("account {address}")));
        }
        Ok(())
    }

    fn get_miner_account(&self, address: Address) -> Result<Option<MinerAccount>, StorageError> {
        optional(self.reader()?.query_row(
            "SELECT address, shard, mined_blocks, reward, fee, revenue
             FROM miner_accounts WHERE address = ?",
            params![address.as_slice()],
            |row| {
                let address: Vec<u8> = row.get(0)?;
                Ok(MinerAccount {
                    address: address_from_row(&address, 0)?,
                    shard: row.get(1)?,
                    mined_blocks: u64_from_row(row, 2)?,
                    reward: u64_from_row(row, 3)?,
                    fee: u64_from_row(row, 4)?,
                    revenue: u64_from_row(row, 5)?,
                })
            },
        ))
    }

    fn update_miner_account(&self, miner: &MinerAccount) -> Result<(), StorageError> {
        self.writer().execute(
            "INSERT INTO miner_accounts (address, shard, mined_blocks, reward, fee, revenue)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(address) DO UPDATE SET
                 shard = excluded.shard,
                 mined_blocks = excluded.mined_blocks,
                 reward = excluded.reward,
                 fee = excluded.fee,
                 revenue = excluded.revenue",
            params![
                miner.address.as_slice(),
                miner.shard,
                miner.mined_blocks as i64,
                miner.reward as i64,
                miner.fee as i64,
                miner.revenue as i64,
            ],
        )?;
        Ok(())
    }
}

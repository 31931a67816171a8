//! Column encoding helpers.
//!
//! Hashes and addresses are stored as raw blobs, integers as SQLite `INTEGER` (u64 values are
//! stored through an `as i64` cast and restored the same way).

use crate::StorageError;
use alloy_primitives::{Address, B256, Bytes};
use rusqlite::{ErrorCode, Row, params, types::Type};
use shardex_types::{ReceiptSummary, Transaction};

/// Column list shared by the `transactions` and `pending_transactions` tables.
pub(super) const TX_COLUMNS: &str = "shard, hash, from_addr, to_addr, effective_to, amount, fee, \
     timestamp, account_nonce, payload, block_height, idx, contract_address, result, used_gas, \
     failed";

pub(super) fn b256_from_row(bytes: &[u8], col: usize) -> rusqlite::Result<B256> {
    if bytes.len() != 32 {
        return Err(rusqlite::Error::FromSqlConversionFailure(
            col,
            Type::Blob,
            format!("expected 32 bytes for B256, got {}", bytes.len()).into(),
        ));
    }
    Ok(B256::from_slice(bytes))
}

pub(super) fn address_from_row(bytes: &[u8], col: usize) -> rusqlite::Result<Address> {
    if bytes.len() != 20 {
        return Err(rusqlite::Error::FromSqlConversionFailure(
            col,
            Type::Blob,
            format!("expected 20 bytes for Address, got {}", bytes.len()).into(),
        ));
    }
    Ok(Address::from_slice(bytes))
}

pub(super) fn u64_from_row(row: &Row<'_>, col: usize) -> rusqlite::Result<u64> {
    row.get::<_, i64>(col).map(|v| v as u64)
}

fn opt_address(row: &Row<'_>, col: usize) -> rusqlite::Result<Option<Address>> {
    let bytes: Option<Vec<u8>> = row.get(col)?;
    bytes.as_deref().map(|b| address_from_row(b, col)).transpose()
}

/// Decodes a row selected with [`TX_COLUMNS`].
pub(super) fn row_to_transaction(row: &Row<'_>, pending: bool) -> rusqlite::Result<Transaction> {
    let hash: Vec<u8> = row.get(1)?;
    let from: Vec<u8> = row.get(2)?;
    let payload: Vec<u8> = row.get(9)?;
    let result: Vec<u8> = row.get(13)?;

    Ok(Transaction {
        shard: row.get(0)?,
        hash: b256_from_row(&hash, 1)?,
        from: address_from_row(&from, 2)?,
        to: opt_address(row, 3)?,
        amount: u64_from_row(row, 5)?,
        fee: u64_from_row(row, 6)?,
        timestamp: u64_from_row(row, 7)?,
        account_nonce: u64_from_row(row, 8)?,
        payload: Bytes::from(payload),
        block_height: u64_from_row(row, 10)?,
        idx: u64_from_row(row, 11)?,
        pending,
        receipt: ReceiptSummary {
            contract_address: opt_address(row, 12)?,
            result: Bytes::from(result),
            used_gas: u64_from_row(row, 14)?,
            failed: row.get(15)?,
        },
    })
}

/// Inserts `tx` into `table` using [`TX_COLUMNS`].
pub(super) fn insert_transaction(
    conn: &rusqlite::Connection,
    table: &str,
    tx: &Transaction,
) -> Result<(), StorageError> {
    let sql = format!(
        "INSERT INTO {table} ({TX_COLUMNS})
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    conn.execute(
        &sql,
        params![
            tx.shard,
            tx.hash.as_slice(),
            tx.from.as_slice(),
            tx.to.as_ref().map(|a| a.as_slice()),
            tx.effective_to().as_ref().map(|a| a.as_slice()),
            tx.amount as i64,
            tx.fee as i64,
            tx.timestamp as i64,
            tx.account_nonce as i64,
            tx.payload.as_ref(),
            tx.block_height as i64,
            tx.idx as i64,
            tx.receipt.contract_address.as_ref().map(|a| a.as_slice()),
            tx.receipt.result.as_ref(),
            tx.receipt.used_gas as i64,
            tx.receipt.failed,
        ],
    )
    .map_err(|err| conflict_or(err, || format!("transaction {} in {table}", tx.hash)))?;
    Ok(())
}

/// Maps unique constraint violations to [`StorageError::Conflict`].
pub(super) fn conflict_or(err: rusqlite::Error, what: impl FnOnce() -> String) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StorageError::Conflict(what())
        }
        other => StorageError::Database(other),
    }
}

/// Maps a missing single row to `None`.
pub(super) fn optional<T>(result: rusqlite::Result<T>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

//! Derivation of account and miner records from indexed blocks.

use crate::{Metrics, TaskBatch, WorkerPool};
use alloy_primitives::Address;
use shardex_rpc::ChainClient;
use shardex_storage::{IndexStore, StorageError};
use shardex_types::{
    Account, AccountType, Block, MinerAccount, NULL_ADDRESS, ShardNumber, Transaction,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tracing::{debug, warn};

/// What is known about a touched account until the next flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchedAccount {
    /// Account kind. Once an address is seen as a contract it stays one.
    pub account_type: AccountType,
    /// Latest timestamp the account was touched at.
    pub timestamp: u64,
}

/// Addresses whose stored state is stale, coalesced until the next flush.
///
/// Touching the same address many times yields a single refresh.
#[derive(Debug, Clone, Default)]
pub struct TouchedAccounts {
    accounts: HashMap<Address, TouchedAccount>,
    miners: HashSet<Address>,
}

impl TouchedAccounts {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `address` as touched at `timestamp`.
    pub fn touch(&mut self, address: Address, account_type: AccountType, timestamp: u64) {
        self.accounts
            .entry(address)
            .and_modify(|entry| {
                if account_type == AccountType::Contract {
                    entry.account_type = AccountType::Contract;
                }
                entry.timestamp = entry.timestamp.max(timestamp);
            })
            .or_insert(TouchedAccount { account_type, timestamp });
    }

    /// Marks `address` as a block producer whose miner record needs recomputing.
    pub fn touch_miner(&mut self, address: Address) {
        self.miners.insert(address);
    }

    /// Touches every account a transaction involves: the sender, the recipient and a deployed
    /// contract.
    pub fn record_transaction(&mut self, tx: &Transaction, timestamp: u64) {
        self.touch(tx.from, AccountType::Normal, timestamp);
        if let Some(to) = tx.to {
            self.touch(to, AccountType::Normal, timestamp);
        }
        if let Some(contract) = tx.receipt.contract_address {
            self.touch(contract, AccountType::Contract, timestamp);
        }
    }

    /// Touches the creator of `block` and every account of its transactions.
    pub fn record_block(&mut self, block: &Block, txs: &[Transaction]) {
        self.touch(block.creator, AccountType::Normal, block.timestamp);
        self.touch_miner(block.creator);
        for tx in txs {
            self.record_transaction(tx, block.timestamp);
        }
    }

    /// Returns the entry of `address`, if touched.
    pub fn get(&self, address: &Address) -> Option<&TouchedAccount> {
        self.accounts.get(address)
    }

    /// Returns `true` if `address` is queued for a miner refresh.
    pub fn contains_miner(&self, address: &Address) -> bool {
        self.miners.contains(address)
    }

    /// Number of touched accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` when nothing was touched.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.miners.is_empty()
    }

    /// Takes the current contents, leaving the set empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Outcome of one [`AccountProjector::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionReport {
    /// Account records written.
    pub accounts: usize,
    /// Miner records written.
    pub miners: usize,
    /// Balance lookups or record writes that failed.
    pub failures: usize,
}

impl ProjectionReport {
    /// Adds the counts of `other`.
    pub const fn merge(&mut self, other: Self) {
        self.accounts += other.accounts;
        self.miners += other.miners;
        self.failures += other.failures;
    }
}

/// Refreshes account and miner records of one shard.
#[derive(Debug)]
pub struct AccountProjector<C, S> {
    shard: ShardNumber,
    client: Arc<C>,
    store: Arc<S>,
    pool: Arc<WorkerPool>,
}

impl<C, S> AccountProjector<C, S>
where
    C: ChainClient + 'static,
    S: IndexStore + 'static,
{
    /// Creates a projector for `shard`.
    pub const fn new(
        shard: ShardNumber,
        client: Arc<C>,
        store: Arc<S>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self { shard, client, store, pool }
    }

    /// Writes fresh records for everything in `touched`.
    ///
    /// Accounts are refreshed first, with their balance fetched from the chain. Miner records
    /// are computed only after every account write has finished, since the mined block count
    /// lands on the account record.
    pub async fn flush(&self, touched: TouchedAccounts) -> ProjectionReport {
        if touched.is_empty() {
            return ProjectionReport::default();
        }
        let TouchedAccounts { accounts, miners } = touched;

        let refreshed = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        let batch = TaskBatch::new();
        for (address, entry) in accounts {
            let shard = self.shard;
            let client = Arc::clone(&self.client);
            let store = Arc::clone(&self.store);
            let refreshed = Arc::clone(&refreshed);
            let failures = Arc::clone(&failures);

            self.pool.submit_to(&batch, async move {
                let balance = if address == NULL_ADDRESS {
                    None
                } else {
                    match client.balance(address).await {
                        Ok(balance) => Some(balance),
                        Err(err) => {
                            warn!(target: "projector", shard, %address, %err, "Failed to fetch balance");
                            failures.fetch_add(1, Ordering::Relaxed);
                            None
                        }
                    }
                };

                match refresh_account(&*store, shard, address, entry, balance) {
                    Ok(()) => {
                        refreshed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        warn!(target: "projector", shard, %address, %err, "Failed to write account");
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
        batch.wait().await;

        let miners_written = Arc::new(AtomicUsize::new(0));
        let batch = TaskBatch::new();
        for miner in miners.into_iter().filter(|miner| *miner != NULL_ADDRESS) {
            let shard = self.shard;
            let store = Arc::clone(&self.store);
            let miners_written = Arc::clone(&miners_written);
            let failures = Arc::clone(&failures);

            self.pool.submit_to(&batch, async move {
                match refresh_miner(&*store, shard, miner) {
                    Ok(()) => {
                        miners_written.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        warn!(target: "projector", shard, %miner, %err, "Failed to write miner");
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
        batch.wait().await;

        let report = ProjectionReport {
            accounts: refreshed.load(Ordering::Relaxed),
            miners: miners_written.load(Ordering::Relaxed),
            failures: failures.load(Ordering::Relaxed),
        };
        Metrics::record_accounts_refreshed(self.shard, report.accounts);
        debug!(
            target: "projector",
            shard = self.shard,
            accounts = report.accounts,
            miners = report.miners,
            failures = report.failures,
            "Flushed touched accounts"
        );
        report
    }
}

/// Creates or updates the record of `address`. Without a fresh `balance` the stored one is
/// kept.
fn refresh_account<S: IndexStore + ?Sized>(
    store: &S,
    shard: ShardNumber,
    address: Address,
    entry: TouchedAccount,
    balance: Option<u64>,
) -> Result<(), StorageError> {
    let tx_count = store.tx_count_by_address(shard, address)?;

    match store.get_account(address)? {
        Some(mut account) => {
            if let Some(balance) = balance {
                account.balance = balance;
            }
            if entry.account_type == AccountType::Contract {
                account.account_type = AccountType::Contract;
            }
            account.shard = shard;
            account.tx_count = tx_count;
            account.updated_at = entry.timestamp;
            store.update_account(&account)
        }
        None => {
            let account = Account {
                balance: balance.unwrap_or_default(),
                tx_count,
                updated_at: entry.timestamp,
                ..Account::empty(address, shard, entry.account_type)
            };
            store.add_account(&account)
        }
    }
}

/// Recomputes the miner record of `miner` and copies its block count onto the account.
fn refresh_miner<S: IndexStore + ?Sized>(
    store: &S,
    shard: ShardNumber,
    miner: Address,
) -> Result<(), StorageError> {
    let stats = store.mined_block_stats(shard, miner)?;
    store.update_miner_account(&MinerAccount::from_stats(miner, shard, stats))?;

    match store.update_account_mined_blocks(miner, stats.count) {
        Err(StorageError::EntryNotFound(_)) => {
            // the account write of phase one failed; it is retried on the next touch
            Ok(())
        }
        other => other,
    }
}

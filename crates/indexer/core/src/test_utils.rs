//! Test utilities for the sync engine.

use alloy_primitives::{Address, B256, keccak256};
use async_trait::async_trait;
use shardex_rpc::{ChainClient, ChainClientError, ClientError};
use shardex_types::{
    ChainBlock, ChainDebt, ChainHead, ChainHeader, ChainTransaction, NULL_ADDRESS, TxReceipt,
};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Amount of the reward transaction included in every fake block.
pub const BLOCK_REWARD: u64 = 100;

/// Gas used by every fake user transaction.
pub const TX_GAS: u64 = 21_000;

/// Gas price of transactions built by [`FakeChain::transfer`].
pub const GAS_PRICE: u64 = 2;

/// Miner of fake blocks unless changed with [`FakeChain::set_miner`].
pub const DEFAULT_MINER: Address = Address::repeat_byte(0xfe);

/// A deterministic in-memory chain implementing [`ChainClient`].
///
/// The chain starts with a genesis block. Every block carries a reward transaction from the
/// null address to its miner, followed by the transactions given to
/// [`FakeChain::push_block`]. After [`FakeChain::reorg`] newly pushed blocks get different hashes
/// than the ones they replace.
#[derive(Debug)]
pub struct FakeChain {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    blocks: Vec<ChainBlock>,
    receipts: HashMap<B256, TxReceipt>,
    balances: HashMap<Address, u64>,
    balance_requests: HashMap<Address, usize>,
    pending: Vec<ChainTransaction>,
    miner: Address,
    fork: u64,
    nonce: u64,
    fail_receipts: bool,
    fail_balances: bool,
    fail_pending: bool,
    fail_blocks_from: Option<u64>,
    reorg_after_fetch: Option<ScheduledReorg>,
}

/// A reorg performed right after a block lookup returned.
#[derive(Debug, Clone, Copy)]
struct ScheduledReorg {
    height: u64,
    depth: u64,
    blocks: usize,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChain {
    /// Creates a chain holding only the genesis block.
    pub fn new() -> Self {
        let chain =
            Self { state: Mutex::new(State { miner: DEFAULT_MINER, ..Default::default() }) };
        chain.push_block(Vec::new());
        chain
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Height of the head block.
    pub fn tip(&self) -> u64 {
        self.state().blocks.len() as u64 - 1
    }

    /// Returns the canonical block at `height`.
    pub fn block(&self, height: u64) -> Option<ChainBlock> {
        self.state().blocks.get(height as usize).cloned()
    }

    /// Sets the miner of subsequently pushed blocks.
    pub fn set_miner(&self, miner: Address) {
        self.state().miner = miner;
    }

    /// Builds a transfer with a fresh hash.
    pub fn transfer(&self, from: Address, to: Address, amount: u64) -> ChainTransaction {
        let mut state = self.state();
        state.nonce += 1;
        ChainTransaction {
            hash: keccak256([b"tx".as_slice(), state.nonce.to_be_bytes().as_slice()].concat()),
            from,
            to: Some(to),
            amount,
            account_nonce: state.nonce,
            gas_price: GAS_PRICE,
            gas_limit: TX_GAS * 2,
            ..Default::default()
        }
    }

    /// Builds a contract creation with a fresh hash.
    pub fn deploy(&self, from: Address) -> ChainTransaction {
        ChainTransaction { to: None, amount: 0, ..self.transfer(from, Address::ZERO, 0) }
    }

    /// The address a creation transaction deploys to.
    pub fn contract_address(tx_hash: B256) -> Address {
        Address::from_slice(&keccak256(tx_hash)[12..])
    }

    /// Appends a block containing the reward transaction and `txs`.
    pub fn push_block(&self, txs: Vec<ChainTransaction>) -> ChainBlock {
        self.push_block_with_debts(txs, &[])
    }

    /// Appends a block like [`FakeChain::push_block`] that also settles a debt crediting each
    /// `(account, amount)` pair.
    pub fn push_block_with_debts(
        &self,
        txs: Vec<ChainTransaction>,
        debts: &[(Address, u64)],
    ) -> ChainBlock {
        let mut state = self.state();
        let height = state.blocks.len() as u64;
        let timestamp = 1_000 + height * 10;
        let salt = [state.fork.to_be_bytes(), height.to_be_bytes()].concat();

        let reward = ChainTransaction {
            hash: keccak256([b"reward".as_slice(), salt.as_slice()].concat()),
            from: NULL_ADDRESS,
            to: Some(state.miner),
            amount: BLOCK_REWARD,
            timestamp,
            ..Default::default()
        };
        state.receipts.insert(reward.hash, TxReceipt::default());

        for tx in &txs {
            let contract_address =
                tx.is_contract_creation().then(|| Self::contract_address(tx.hash));
            let receipt = TxReceipt { used_gas: TX_GAS, contract_address, ..Default::default() };
            state.receipts.insert(tx.hash, receipt);
        }

        let block = ChainBlock {
            hash: keccak256([b"block".as_slice(), salt.as_slice()].concat()),
            header: ChainHeader {
                previous_block_hash: state.blocks.last().map(|b| b.hash).unwrap_or_default(),
                creator: state.miner,
                difficulty: 1,
                height,
                create_timestamp: timestamp,
            },
            transactions: std::iter::once(reward).chain(txs).collect(),
            debts: debts
                .iter()
                .enumerate()
                .map(|(i, &(account, amount))| ChainDebt {
                    hash: keccak256(
                        [b"debt".as_slice(), salt.as_slice(), [i as u8].as_slice()].concat(),
                    ),
                    account,
                    amount,
                    ..Default::default()
                })
                .collect(),
        };
        state.blocks.push(block.clone());
        block
    }

    /// Drops the `depth` newest blocks. Blocks pushed afterwards form a new branch.
    pub fn reorg(&self, depth: u64) {
        let mut state = self.state();
        let keep = state.blocks.len().saturating_sub(depth as usize).max(1);
        state.blocks.truncate(keep);
        state.fork += 1;
    }

    /// Once block `height` has been fetched, replaces the `depth` newest blocks with `blocks`
    /// empty ones, as if the chain reorganized while the caller was reading it.
    pub fn reorg_after_fetch(&self, height: u64, depth: u64, blocks: usize) {
        self.state().reorg_after_fetch = Some(ScheduledReorg { height, depth, blocks });
    }

    /// Sets the balance reported for `address`.
    pub fn set_balance(&self, address: Address, balance: u64) {
        self.state().balances.insert(address, balance);
    }

    /// Number of balance requests made for `address`.
    pub fn balance_requests(&self, address: Address) -> usize {
        self.state().balance_requests.get(&address).copied().unwrap_or_default()
    }

    /// Replaces the mempool.
    pub fn set_pending(&self, txs: Vec<ChainTransaction>) {
        self.state().pending = txs;
    }

    /// Makes receipt lookups fail.
    pub fn fail_receipts(&self, fail: bool) {
        self.state().fail_receipts = fail;
    }

    /// Makes balance lookups fail.
    pub fn fail_balances(&self, fail: bool) {
        self.state().fail_balances = fail;
    }

    /// Makes mempool lookups fail.
    pub fn fail_pending(&self, fail: bool) {
        self.state().fail_pending = fail;
    }

    /// Makes block lookups at or above `height` fail.
    pub fn fail_blocks_from(&self, height: Option<u64>) {
        self.state().fail_blocks_from = height;
    }
}

fn unavailable(what: impl std::fmt::Display) -> ChainClientError {
    ChainClientError::Rpc(ClientError::Custom(what.to_string()))
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn current_block(&self) -> Result<ChainHead, ChainClientError> {
        let state = self.state();
        let head = state.blocks.last().ok_or_else(|| unavailable("empty chain"))?;
        Ok(ChainHead {
            height: head.header.height,
            hash: head.hash,
            timestamp: head.header.create_timestamp,
            difficulty: head.header.difficulty,
            creator: head.header.creator,
        })
    }

    async fn block_by_height(
        &self,
        height: u64,
        _full_tx: bool,
    ) -> Result<ChainBlock, ChainClientError> {
        let (block, reorg) = {
            let mut state = self.state();
            if state.fail_blocks_from.is_some_and(|from| height >= from) {
                return Err(unavailable(format!("block {height} unavailable")));
            }
            let block = state
                .blocks
                .get(height as usize)
                .cloned()
                .ok_or_else(|| unavailable(format!("block {height} not found")))?;
            let reorg = state.reorg_after_fetch.take_if(|reorg| reorg.height == height);
            (block, reorg)
        };

        if let Some(reorg) = reorg {
            self.reorg(reorg.depth);
            for _ in 0..reorg.blocks {
                self.push_block(Vec::new());
            }
        }
        Ok(block)
    }

    async fn receipt_by_tx_hash(&self, hash: B256) -> Result<TxReceipt, ChainClientError> {
        let state = self.state();
        if state.fail_receipts {
            return Err(unavailable("receipts unavailable"));
        }
        state.receipts.get(&hash).cloned().ok_or_else(|| unavailable(format!("no receipt {hash}")))
    }

    async fn balance(&self, address: Address) -> Result<u64, ChainClientError> {
        let mut state = self.state();
        *state.balance_requests.entry(address).or_default() += 1;
        if state.fail_balances {
            return Err(unavailable("balances unavailable"));
        }
        Ok(state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn pending_transactions(&self) -> Result<Vec<ChainTransaction>, ChainClientError> {
        let state = self.state();
        if state.fail_pending {
            return Err(unavailable("mempool unavailable"));
        }
        Ok(state.pending.clone())
    }
}

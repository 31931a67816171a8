//! End-to-end sync scenarios against a fake chain and an in-memory store.

use alloy_primitives::Address;
use rstest::rstest;
use shardex_core::{
    SyncConfig, SyncOrchestrator,
    test_utils::{BLOCK_REWARD, DEFAULT_MINER, FakeChain, GAS_PRICE, TX_GAS},
};
use shardex_storage::{
    AccountStorage, BlockStorage, PendingTxStorage, SqliteStore, TransactionStorage,
};
use shardex_types::AccountType;
use std::{collections::HashSet, sync::Arc};

const SHARD: u32 = 1;

fn setup(
    chain: &Arc<FakeChain>,
    workers: usize,
    flush_threshold: usize,
) -> (SyncOrchestrator<FakeChain, SqliteStore>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let config =
        SyncConfig::new(SHARD).with_worker_count(workers).with_flush_threshold(flush_threshold);
    (SyncOrchestrator::new(config, Arc::clone(chain), Arc::clone(&store)), store)
}

/// Asserts the store holds exactly the chain's blocks with dense sequence numbers.
fn assert_mirrors_chain(chain: &FakeChain, store: &SqliteStore) {
    assert_eq!(store.block_height(SHARD).unwrap(), chain.tip() + 1);

    let mut expected_idx = 1;
    for height in 0..=chain.tip() {
        let canonical = chain.block(height).unwrap();
        let stored = store.get_block_by_height(SHARD, height).unwrap().unwrap();
        assert_eq!(stored.hash, canonical.hash, "hash at height {height}");

        let txs = store.get_txs_by_height(SHARD, height).unwrap();
        assert_eq!(txs.len(), canonical.transactions.len(), "tx count at height {height}");
        for (tx, chain_tx) in txs.iter().zip(&canonical.transactions) {
            assert_eq!(tx.hash, chain_tx.hash);
            assert_eq!(tx.idx, expected_idx);
            expected_idx += 1;
        }
    }
    assert_eq!(store.tx_count_by_shard(SHARD).unwrap(), expected_idx - 1);
}

#[rstest]
#[case::single_worker(1, 1)]
#[case::small_flushes(4, 2)]
#[case::one_flush(8, 1_000)]
#[tokio::test]
async fn test_catch_up_converges(#[case] workers: usize, #[case] flush_threshold: usize) {
    let chain = Arc::new(FakeChain::new());
    let alice = Address::repeat_byte(0xa1);
    let bob = Address::repeat_byte(0xb0);
    for i in 0..6 {
        let mut txs = vec![chain.transfer(alice, bob, i + 1)];
        if i % 2 == 0 {
            txs.push(chain.deploy(bob));
        }
        chain.push_block(txs);
    }
    chain.set_balance(alice, 500);
    chain.set_balance(bob, 70);

    let (mut syncer, store) = setup(&chain, workers, flush_threshold);
    let report = syncer.run_cycle().await.unwrap();

    assert_eq!(report.ingested, 7);
    assert_mirrors_chain(&chain, &store);

    let alice_account = store.get_account(alice).unwrap().unwrap();
    assert_eq!(alice_account.balance, 500);
    assert_eq!(alice_account.tx_count, 6);

    // transfers plus three deployments
    assert_eq!(store.get_account(bob).unwrap().unwrap().tx_count, 9);

    let contract = FakeChain::contract_address(chain.block(1).unwrap().transactions[2].hash);
    assert_eq!(store.get_account(contract).unwrap().unwrap().account_type, AccountType::Contract);

    let miner = store.get_miner_account(DEFAULT_MINER).unwrap().unwrap();
    assert_eq!(miner.mined_blocks, 7);
    assert_eq!(miner.reward, 7 * BLOCK_REWARD);
    assert_eq!(miner.fee, 9 * GAS_PRICE * TX_GAS);
    assert_eq!(miner.revenue, miner.reward + miner.fee);
    assert_eq!(store.get_account(DEFAULT_MINER).unwrap().unwrap().mined_blocks, 7);
}

#[tokio::test]
async fn test_repeated_cycles_are_idempotent() {
    let chain = Arc::new(FakeChain::new());
    for _ in 0..3 {
        chain.push_block(vec![chain.transfer(Address::repeat_byte(1), Address::repeat_byte(2), 1)]);
    }
    let (mut syncer, store) = setup(&chain, 2, 100);

    syncer.run_cycle().await.unwrap();
    let txs = store.tx_count_by_shard(SHARD).unwrap();

    let report = syncer.run_cycle().await.unwrap();
    assert_eq!(report.ingested, 0);
    assert!(report.rolled_back.is_empty());
    assert_eq!(store.tx_count_by_shard(SHARD).unwrap(), txs);
    assert_mirrors_chain(&chain, &store);

    // a fresh syncer on the same store resumes at the same cursor
    let mut restarted =
        SyncOrchestrator::new(SyncConfig::new(SHARD), Arc::clone(&chain), Arc::clone(&store));
    assert_eq!(restarted.run_cycle().await.unwrap().ingested, 0);
}

#[tokio::test]
async fn test_reorg_converges_with_fresh_balances() {
    let chain = Arc::new(FakeChain::new());
    let alice = Address::repeat_byte(0xa1);
    let bob = Address::repeat_byte(0xb0);
    let carol = Address::repeat_byte(0xc0);
    for _ in 0..5 {
        chain.push_block(vec![chain.transfer(alice, bob, 10)]);
    }
    chain.set_balance(bob, 50);
    let (mut syncer, store) = setup(&chain, 4, 100);
    syncer.run_cycle().await.unwrap();
    assert_eq!(store.get_account(bob).unwrap().unwrap().tx_count, 5);

    // heights 4 and 5 are replaced by three blocks paying carol instead
    chain.reorg(2);
    let other_miner = Address::repeat_byte(0xee);
    chain.set_miner(other_miner);
    for _ in 0..3 {
        chain.push_block(vec![chain.transfer(alice, carol, 10)]);
    }
    chain.set_balance(bob, 30);
    chain.set_balance(carol, 30);

    let report = syncer.run_cycle().await.unwrap();
    assert_eq!(report.rolled_back, vec![5, 4]);
    assert_eq!(report.ingested, 3);
    assert_mirrors_chain(&chain, &store);

    let bob_account = store.get_account(bob).unwrap().unwrap();
    assert_eq!(bob_account.balance, 30);
    assert_eq!(bob_account.tx_count, 3);
    assert_eq!(store.get_account(carol).unwrap().unwrap().balance, 30);

    assert_eq!(store.get_miner_account(DEFAULT_MINER).unwrap().unwrap().mined_blocks, 4);
    assert_eq!(store.get_miner_account(other_miner).unwrap().unwrap().mined_blocks, 3);
}

#[tokio::test]
async fn test_failed_balance_keeps_previous_value() {
    let chain = Arc::new(FakeChain::new());
    let alice = Address::repeat_byte(0xa1);
    let bob = Address::repeat_byte(0xb0);
    chain.push_block(vec![chain.transfer(alice, bob, 1)]);
    chain.set_balance(bob, 40);
    let (mut syncer, store) = setup(&chain, 2, 100);
    syncer.run_cycle().await.unwrap();

    chain.fail_balances(true);
    chain.set_balance(bob, 1);
    chain.push_block(vec![chain.transfer(alice, bob, 1)]);
    let report = syncer.run_cycle().await.unwrap();

    assert!(report.projection.failures > 0);
    let bob_account = store.get_account(bob).unwrap().unwrap();
    assert_eq!(bob_account.balance, 40);
    assert_eq!(bob_account.tx_count, 2);
}

#[tokio::test]
async fn test_touched_accounts_are_coalesced() {
    let chain = Arc::new(FakeChain::new());
    let alice = Address::repeat_byte(0xa1);
    let bob = Address::repeat_byte(0xb0);
    for _ in 0..10 {
        chain.push_block(vec![chain.transfer(alice, bob, 1), chain.transfer(bob, alice, 1)]);
    }
    let (mut syncer, _store) = setup(&chain, 4, 1_000);

    syncer.run_cycle().await.unwrap();

    assert_eq!(chain.balance_requests(alice), 1);
    assert_eq!(chain.balance_requests(bob), 1);
}

#[tokio::test]
async fn test_mempool_mirror_matches_node() {
    let chain = Arc::new(FakeChain::new());
    let a = Address::repeat_byte(1);
    let b = Address::repeat_byte(2);
    let mempool = vec![chain.transfer(a, b, 1), chain.transfer(a, b, 2), chain.transfer(b, a, 3)];
    chain.set_pending(mempool.clone());
    let (mut syncer, store) = setup(&chain, 2, 100);

    assert_eq!(syncer.run_cycle().await.unwrap().pending, 3);
    let stored = store.get_pending_txs(SHARD).unwrap();
    assert_eq!(stored.iter().map(|tx| tx.idx).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(
        stored.iter().map(|tx| tx.hash).collect::<HashSet<_>>(),
        mempool.iter().map(|tx| tx.hash).collect::<HashSet<_>>()
    );

    chain.set_pending(mempool[1..].to_vec());
    syncer.run_cycle().await.unwrap();
    assert_eq!(
        store.get_pending_txs(SHARD).unwrap().iter().map(|tx| tx.hash).collect::<HashSet<_>>(),
        mempool[1..].iter().map(|tx| tx.hash).collect::<HashSet<_>>()
    );
}

#[tokio::test]
async fn test_reorg_while_catching_up_leaves_no_stale_blocks() {
    let chain = Arc::new(FakeChain::new());
    let alice = Address::repeat_byte(0xa1);
    let bob = Address::repeat_byte(0xb0);
    for _ in 0..4 {
        chain.push_block(vec![chain.transfer(alice, bob, 1)]);
    }
    let (mut syncer, store) = setup(&chain, 2, 100);
    syncer.run_cycle().await.unwrap();

    // the node switches branches after serving height 6 of the old one
    for _ in 0..4 {
        chain.push_block(vec![chain.transfer(alice, bob, 1)]);
    }
    chain.reorg_after_fetch(6, 3, 5);

    assert!(syncer.run_cycle().await.is_err());
    for _ in 0..2 {
        syncer.run_cycle().await.unwrap();
    }
    assert_mirrors_chain(&chain, &store);
}

#[tokio::test]
async fn test_rolled_back_debt_refreshes_recipient() {
    let chain = Arc::new(FakeChain::new());
    let creditor = Address::repeat_byte(0xdd);
    chain.push_block(Vec::new());
    chain.push_block_with_debts(Vec::new(), &[(creditor, 50)]);
    chain.set_balance(creditor, 50);
    let (mut syncer, store) = setup(&chain, 2, 100);
    syncer.run_cycle().await.unwrap();
    assert_eq!(store.get_account(creditor).unwrap().unwrap().balance, 50);

    // the crediting block is replaced by an empty one
    chain.reorg(1);
    chain.push_block(Vec::new());
    chain.set_balance(creditor, 0);

    let report = syncer.run_cycle().await.unwrap();
    assert_eq!(report.rolled_back, vec![2]);
    assert_eq!(store.get_account(creditor).unwrap().unwrap().balance, 0);
    assert_mirrors_chain(&chain, &store);
}

//! Ledger integration tests
//!
//! Exercise the ledger end to end against an on-disk sled store in a
//! temporary directory.

use num_bigint::BigUint;
use pow_ledger::core::GENESIS_COINBASE_DATA;
use pow_ledger::{
    Block, Ledger, LedgerConfig, LedgerError, ProofOfWork, TXInput, TXOutput, Transaction,
    UtxoDeriver,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const SUBSIDY: u64 = 10;

fn test_config(path: &Path) -> LedgerConfig {
    LedgerConfig::new(path.join("ledger"))
        .with_difficulty_bits(8)
        .with_subsidy(SUBSIDY)
}

fn chain(ledger: &Ledger) -> Vec<Block> {
    ledger
        .iterator()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn test_every_block_meets_target() {
    let temp_dir = tempdir().unwrap();
    let ledger = Ledger::open(&test_config(temp_dir.path()), "A").unwrap();
    for _ in 0..3 {
        ledger.mine_block("A", "", &[]).unwrap();
    }

    let pow = ProofOfWork::new(8);
    for block in chain(&ledger) {
        assert!(pow.validate(&block));
        assert!(BigUint::from_bytes_be(block.get_hash()) < *pow.get_target());
    }
}

#[test]
fn test_chain_length_and_single_genesis() {
    let temp_dir = tempdir().unwrap();
    let ledger = Ledger::open(&test_config(temp_dir.path()), "A").unwrap();

    let n = 4;
    for i in 0..n {
        ledger.mine_block("A", &format!("block {i}"), &[]).unwrap();
    }

    let blocks = chain(&ledger);
    assert_eq!(blocks.len(), n + 1);
    let genesis: Vec<_> = blocks.iter().filter(|b| b.is_genesis()).collect();
    assert_eq!(genesis.len(), 1);
    assert!(blocks.last().unwrap().get_pre_block_hash().is_empty());
    assert_eq!(ledger.audit().unwrap(), n + 1);
}

#[test]
fn test_persists_across_reopen() {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());

    let tip = {
        let ledger = Ledger::open(&config, "A").unwrap();
        let block = ledger.mine_block("B", "", &[]).unwrap();
        ledger.close().unwrap();
        block.get_hash().to_vec()
    };

    let ledger = Ledger::open_existing(&config).unwrap();
    assert_eq!(ledger.get_tip_hash(), tip);
    assert_eq!(chain(&ledger).len(), 2);
    assert_eq!(ledger.balance("A").unwrap(), SUBSIDY);
    assert_eq!(ledger.balance("B").unwrap(), SUBSIDY);

    let genesis = chain(&ledger).pop().unwrap();
    assert_eq!(
        genesis.get_transactions()[0].get_vin()[0].get_unlock_proof(),
        GENESIS_COINBASE_DATA
    );
}

#[test]
fn test_open_existing_without_chain() {
    let temp_dir = tempdir().unwrap();
    let result = Ledger::open_existing(&test_config(temp_dir.path()));
    assert!(matches!(result, Err(LedgerError::NotFound(_))));
}

#[test]
fn test_open_rejects_invalid_config() {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path()).with_difficulty_bits(0);
    let result = Ledger::open(&config, "A");
    assert!(matches!(result, Err(LedgerError::Config(_))));
}

#[test]
fn test_balance_with_two_coinbases() {
    let temp_dir = tempdir().unwrap();
    let ledger = Ledger::open(&test_config(temp_dir.path()), "A").unwrap();
    ledger
        .add_block(&[Transaction::new_coinbase_tx("A", "", SUBSIDY).unwrap()])
        .unwrap();

    assert_eq!(ledger.balance("A").unwrap(), 2 * SUBSIDY);
    assert_eq!(ledger.balance("B").unwrap(), 0);
}

#[test]
fn test_spend_moves_output_between_owners() {
    let temp_dir = tempdir().unwrap();
    let ledger = Ledger::open(&test_config(temp_dir.path()), "A").unwrap();
    let genesis_tx = chain(&ledger)[0].get_transactions()[0].clone();

    let spend = Transaction::new_transfer(
        vec![TXInput::new(genesis_tx.get_id(), 0, "A")],
        vec![TXOutput::new(SUBSIDY, "B")],
    )
    .unwrap();
    ledger.add_block(&[spend.clone()]).unwrap();

    let utxo = UtxoDeriver::new(&ledger);
    let a_unspent = utxo.find_unspent("A").unwrap();
    assert!(!a_unspent
        .iter()
        .any(|u| u.txid == genesis_tx.get_id() && u.index == 0));
    let b_unspent = utxo.unspent_outputs_for("B").unwrap();
    assert_eq!(b_unspent, vec![TXOutput::new(SUBSIDY, "B")]);
}

#[test]
fn test_send_flow_with_change_and_reward() {
    let temp_dir = tempdir().unwrap();
    let ledger = Ledger::open(&test_config(temp_dir.path()), "A").unwrap();

    let tx = Transaction::new_utxo_transaction("A", "B", 3, &UtxoDeriver::new(&ledger)).unwrap();
    ledger.mine_block("A", "", &[tx]).unwrap();

    // 10 - 3 change plus a fresh reward for mining the block
    assert_eq!(ledger.balance("A").unwrap(), 7 + SUBSIDY);
    assert_eq!(ledger.balance("B").unwrap(), 3);

    let tx = Transaction::new_utxo_transaction("B", "C", 3, &UtxoDeriver::new(&ledger)).unwrap();
    ledger.add_block(&[tx]).unwrap();
    assert_eq!(ledger.balance("B").unwrap(), 0);
    assert_eq!(ledger.balance("C").unwrap(), 3);

    let result = Transaction::new_utxo_transaction("B", "C", 1, &UtxoDeriver::new(&ledger));
    assert_eq!(
        result,
        Err(LedgerError::InsufficientFunds {
            required: 1,
            available: 0,
        })
    );
}

#[test]
fn test_cancel_from_another_thread() {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let ledger = Ledger::open(&config, "A").unwrap();
    let tip_before = ledger.get_tip_hash();

    // A target no hash will meet keeps the search running until cancelled
    let hard_config = config.clone().with_difficulty_bits(255);
    let hard = Ledger::open_with_store(ledger.get_store().clone(), &hard_config, "A").unwrap();

    let cancel = Arc::new(AtomicBool::new(false));
    let worker = {
        let cancel = Arc::clone(&cancel);
        thread::spawn(move || {
            let tx = Transaction::new_coinbase_tx("B", "", SUBSIDY).unwrap();
            hard.add_block_with_cancel(&[tx], &cancel)
        })
    };
    thread::sleep(Duration::from_millis(50));
    cancel.store(true, Ordering::SeqCst);

    assert_eq!(worker.join().unwrap(), Err(LedgerError::Cancelled));
    assert_eq!(ledger.get_store().read_tip().unwrap(), Some(tip_before));
    assert_eq!(chain(&ledger).len(), 1);
}

#[test]
fn test_corrupt_block_surfaces_decode_error() {
    let temp_dir = tempdir().unwrap();
    let ledger = Ledger::open(&test_config(temp_dir.path()), "A").unwrap();
    ledger.mine_block("A", "", &[]).unwrap();

    let tip = ledger.get_tip_hash();
    ledger.get_store().put(&tip, &[0xFF, 0x00, 0x13]).unwrap();

    let result = ledger.balance("A");
    assert!(matches!(result, Err(LedgerError::Decode(_))));
    assert!(result.unwrap_err().is_fatal());
}

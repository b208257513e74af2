// Entry point for the ledger CLI
// This is the only place that decides whether an error ends the session
use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, LevelFilter};
use pow_ledger::{Command, Ledger, LedgerConfig, LedgerError, Opt, Transaction, UtxoDeriver};
use std::process;

fn main() {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run(opt) {
        if e.is_fatal() {
            error!("Ledger state is not trustworthy, stopping: {e}");
        } else {
            error!("Error: {e}");
        }
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), LedgerError> {
    let config = LedgerConfig::load(opt.config.as_deref())?;

    match opt.command {
        Command::Createblockchain { address } => {
            let ledger = Ledger::open(&config, &address)?;
            println!("Done! Tip: {}", HEXLOWER.encode(&ledger.get_tip_hash()));
            ledger.close()?;
        }
        Command::GetBalance { address } => {
            let ledger = Ledger::open_existing(&config)?;
            let balance = ledger.balance(&address)?;
            println!("Balance of '{address}': {balance}");
            ledger.close()?;
        }
        Command::AddBlock { miner, data } => {
            let ledger = Ledger::open_existing(&config)?;
            let block = ledger.mine_block(&miner, &data, &[])?;
            println!("Success! Block {}", block.get_hash_hex());
            ledger.close()?;
        }
        Command::Send { from, to, amount } => {
            let ledger = Ledger::open_existing(&config)?;
            let transaction =
                Transaction::new_utxo_transaction(&from, &to, amount, &UtxoDeriver::new(&ledger))?;
            // The sender mines the block and collects the reward
            ledger.mine_block(&from, "", &[transaction])?;
            println!("Success!");
            ledger.close()?;
        }
        Command::Printchain => {
            let ledger = Ledger::open_existing(&config)?;
            for block in ledger.iterator() {
                let block = block?;
                println!("Prev. hash: {}", HEXLOWER.encode(block.get_pre_block_hash()));
                println!("Hash: {}", block.get_hash_hex());
                println!("Timestamp: {}", block.get_timestamp());
                println!("Nonce: {}", block.get_nonce());
                for tx in block.get_transactions() {
                    println!("- Transaction {}", HEXLOWER.encode(tx.get_id()));
                    if tx.is_coinbase() {
                        println!("-- Coinbase: {}", tx.get_vin()[0].get_unlock_proof());
                    } else {
                        for input in tx.get_vin() {
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                                input.get_unlock_proof()
                            );
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output value = {}, to = {}",
                            output.get_value(),
                            output.get_lock_condition()
                        );
                    }
                }
                println!("PoW: {}", ledger.get_proof_of_work().validate(&block));
                println!();
            }
            ledger.close()?;
        }
    }
    Ok(())
}

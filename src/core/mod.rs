//! Core ledger functionality
//!
//! Blocks, transactions, proof-of-work, the persisted chain with its tip
//! pointer, and UTXO derivation over that chain.

pub mod block;
pub mod ledger;
pub mod proof_of_work;
pub mod transaction;
pub mod utxo;

pub use block::Block;
pub use ledger::{ChainIterator, Ledger, GENESIS_COINBASE_DATA};
pub use proof_of_work::ProofOfWork;
pub use transaction::{TXInput, TXOutput, Transaction, SUBSIDY};
pub use utxo::{UnspentOutput, UtxoDeriver};

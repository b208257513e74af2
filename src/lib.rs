//! # pow-ledger - a single-node proof-of-work ledger
//!
//! An append-only chain of mined blocks stored in an embedded sled database,
//! with balances derived by scanning the chain for unspent outputs.
//!
//! ## Layout
//! - `core/`: blocks, transactions, proof-of-work, the ledger and UTXO derivation
//! - `storage/`: the sled-backed block store (blocks by hash, tip under `"1"`)
//! - `config/`: the explicit configuration value passed to `Ledger::open`
//! - `error/`: the error taxonomy shared by every operation
//! - `utils/`: hashing, timestamps and bincode helpers
//! - `cli/`: command-line parsing for the `pow-ledger` binary
//!
//! ## Guarantees
//! - Every stored block satisfies `hash < 2^(256 - difficulty_bits)`.
//! - Following `pre_block_hash` from the tip reaches exactly one genesis block.
//! - An append either persists the new block and moves the tip, or changes nothing.
//!
//! Ownership of outputs is a plain string match between an input's unlock
//! proof and an output's lock condition; there are no signatures.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::LedgerConfig;
pub use self::core::{
    Block, ChainIterator, Ledger, ProofOfWork, TXInput, TXOutput, Transaction, UnspentOutput,
    UtxoDeriver,
};
pub use error::{LedgerError, Result};
pub use storage::BlockStore;
pub use utils::{current_timestamp, sha256_digest};

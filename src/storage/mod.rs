//! Data storage and persistence
//!
//! The ledger keeps every block and its tip pointer in one sled tree:
//! `<block hash>` maps to the serialized block and the key `"1"` maps to the
//! hash of the newest block.

pub mod block_store;

pub use block_store::{BlockStore, TIP_BLOCK_HASH_KEY};

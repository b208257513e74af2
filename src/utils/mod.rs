//! Utility functions and helpers
//!
//! Hashing, timestamps and the bincode layer used for everything persisted.

pub mod crypto;
pub mod serialization;

pub use crypto::{current_timestamp, sha256_digest};

pub use serialization::{deserialize, serialize};

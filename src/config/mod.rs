//! Configuration management
//!
//! The ledger takes an explicit [`LedgerConfig`] value: store location, tree
//! name, difficulty and coinbase subsidy. It can be read from a TOML file and
//! overridden from the environment.

pub mod settings;

pub use settings::LedgerConfig;

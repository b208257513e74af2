//! Error handling for the ledger
//!
//! Every fallible ledger operation returns [`Result`]; nothing in the library
//! aborts the process. The binary decides what is fatal.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error taxonomy for ledger operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Corrupt or malformed persisted block/transaction bytes
    Decode(String),
    /// A value could not be encoded for storage or hashing
    Encode(String),
    /// The backing store cannot be opened or a transaction cannot commit
    StoreUnavailable(String),
    /// A key the ledger expects (tip, block) is missing
    NotFound(String),
    /// The nonce space was exhausted without meeting the target
    ProofExhausted { max_nonce: i64 },
    /// Mining was cancelled by the caller
    Cancelled,
    /// The tip moved between the read and the commit of an append
    StaleTip,
    /// Block validation errors
    InvalidBlock(String),
    /// Transaction validation errors
    Transaction(String),
    /// Insufficient funds for a transfer
    InsufficientFunds { required: u64, available: u64 },
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
}

impl LedgerError {
    /// Whether the session must stop trusting the ledger after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::Decode(_) | LedgerError::StoreUnavailable(_) | LedgerError::Io(_)
        )
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Decode(msg) => write!(f, "Decode error: {msg}"),
            LedgerError::Encode(msg) => write!(f, "Encode error: {msg}"),
            LedgerError::StoreUnavailable(msg) => write!(f, "Store unavailable: {msg}"),
            LedgerError::NotFound(msg) => write!(f, "Not found: {msg}"),
            LedgerError::ProofExhausted { max_nonce } => {
                write!(f, "Proof-of-work exhausted nonce space (max nonce {max_nonce})")
            }
            LedgerError::Cancelled => write!(f, "Mining cancelled"),
            LedgerError::StaleTip => write!(f, "Tip changed while appending a block"),
            LedgerError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            LedgerError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            LedgerError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::StoreUnavailable(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::Encode(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::Decode(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_decode_errors_are_fatal() {
        assert!(LedgerError::StoreUnavailable("commit".to_string()).is_fatal());
        assert!(LedgerError::Decode("block".to_string()).is_fatal());
        assert!(!LedgerError::Cancelled.is_fatal());
        assert!(!LedgerError::StaleTip.is_fatal());
    }

    #[test]
    fn test_display_includes_context() {
        let err = LedgerError::NotFound("block 00ff".to_string());
        assert_eq!(err.to_string(), "Not found: block 00ff");

        let err = LedgerError::InsufficientFunds {
            required: 7,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: required 7, available 3"
        );
    }
}

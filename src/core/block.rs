use crate::core::{ProofOfWork, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::{current_timestamp, deserialize, serialize, sha256_digest};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    timestamp: i64,
    transactions: Vec<Transaction>,
    pre_block_hash: Vec<u8>, // Empty only for the genesis block
    hash: Vec<u8>,
    nonce: i64,
}

impl Block {
    /// Mine a block on top of `pre_block_hash`.
    pub fn new_block(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        pow: &ProofOfWork,
    ) -> Result<Block> {
        Self::new_block_with_cancel(pre_block_hash, transactions, pow, &AtomicBool::new(false))
    }

    /// Mine a block, giving up with [`LedgerError::Cancelled`] once `cancel` is set.
    pub fn new_block_with_cancel(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        pow: &ProofOfWork,
        cancel: &AtomicBool,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(LedgerError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let mut block = Block {
            timestamp: current_timestamp()?,
            transactions: transactions.to_vec(),
            pre_block_hash,
            hash: vec![],
            nonce: 0,
        };

        info!(
            "Starting proof-of-work for block with {} transactions (difficulty: {})",
            block.transactions.len(),
            pow.get_difficulty_bits()
        );
        let (nonce, hash) = pow.run_with_cancel(&block, cancel)?;
        block.nonce = nonce;
        block.hash = hash;
        info!(
            "Proof-of-work completed for block: {} (nonce: {nonce})",
            HEXLOWER.encode(&block.hash)
        );

        Ok(block)
    }

    pub fn generate_genesis_block(transaction: &Transaction, pow: &ProofOfWork) -> Result<Block> {
        Block::new_block(vec![], &[transaction.clone()], pow)
    }

    /// SHA-256 over the concatenated transaction ids, in block order.
    pub fn transactions_digest(transactions: &[Transaction]) -> Vec<u8> {
        let mut txhashs = vec![];
        for transaction in transactions {
            txhashs.extend(transaction.get_id());
        }
        sha256_digest(txhashs.as_slice())
    }

    pub fn hash_transactions(&self) -> Vec<u8> {
        Self::transactions_digest(&self.transactions)
    }

    /// The exact bytes hashed into a block id.
    pub fn header_bytes(
        pre_block_hash: &[u8],
        transactions_digest: &[u8],
        timestamp: i64,
        difficulty_bits: u32,
        nonce: i64,
    ) -> Vec<u8> {
        let mut data_bytes =
            Vec::with_capacity(pre_block_hash.len() + transactions_digest.len() + 24);
        data_bytes.extend(pre_block_hash);
        data_bytes.extend(transactions_digest);
        data_bytes.extend(timestamp.to_be_bytes());
        data_bytes.extend(i64::from(difficulty_bits).to_be_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes
    }

    pub fn compute_hash(
        pre_block_hash: &[u8],
        transactions_digest: &[u8],
        timestamp: i64,
        difficulty_bits: u32,
        nonce: i64,
    ) -> Vec<u8> {
        sha256_digest(&Self::header_bytes(
            pre_block_hash,
            transactions_digest,
            timestamp,
            difficulty_bits,
            nonce,
        ))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }

    /// Build a block from raw parts without mining (for testing only)
    #[cfg(test)]
    pub(crate) fn from_parts(
        timestamp: i64,
        transactions: Vec<Transaction>,
        pre_block_hash: Vec<u8>,
        hash: Vec<u8>,
        nonce: i64,
    ) -> Block {
        Block {
            timestamp,
            transactions,
            pre_block_hash,
            hash,
            nonce,
        }
    }
}

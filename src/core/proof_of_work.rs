use crate::config::LedgerConfig;
use crate::core::Block;
use crate::error::{LedgerError, Result};
use crate::utils::sha256_digest;
use log::{debug, warn};
use num_bigint::BigUint;
use std::ops::ShlAssign;
use std::sync::atomic::{AtomicBool, Ordering};

const MAX_NONCE: i64 = i64::MAX;

// How many candidates are tried between checks of the cancel flag
const CANCEL_CHECK_INTERVAL: i64 = 1024;

/// Nonce search and verification against `2^(256 - difficulty_bits)`.
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    target: BigUint,
    difficulty_bits: u32,
    max_nonce: i64,
}

impl ProofOfWork {
    pub fn new(difficulty_bits: u32) -> ProofOfWork {
        let mut target = BigUint::from(1u32);
        target.shl_assign(256 - difficulty_bits.min(256));
        ProofOfWork {
            target,
            difficulty_bits,
            max_nonce: MAX_NONCE,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> ProofOfWork {
        ProofOfWork::new(config.difficulty_bits).with_max_nonce(config.max_nonce)
    }

    /// Bound the search to nonces in `0..max_nonce`.
    pub fn with_max_nonce(mut self, max_nonce: i64) -> ProofOfWork {
        self.max_nonce = max_nonce;
        self
    }

    pub fn get_target(&self) -> &BigUint {
        &self.target
    }

    pub fn get_difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    pub fn prepare_data(&self, block: &Block, nonce: i64) -> Vec<u8> {
        Block::header_bytes(
            block.get_pre_block_hash(),
            &block.hash_transactions(),
            block.get_timestamp(),
            self.difficulty_bits,
            nonce,
        )
    }

    /// Whether `hash`, read as a big-endian unsigned integer, is below the target.
    pub fn meets_target(&self, hash: &[u8]) -> bool {
        BigUint::from_bytes_be(hash) < self.target
    }

    /// Check the stored nonce reproduces the stored hash and that it meets the target.
    pub fn validate(&self, block: &Block) -> bool {
        let data = self.prepare_data(block, block.get_nonce());
        let hash = sha256_digest(data.as_slice());
        hash.as_slice() == block.get_hash() && self.meets_target(&hash)
    }

    pub fn run(&self, block: &Block) -> Result<(i64, Vec<u8>)> {
        self.run_with_cancel(block, &AtomicBool::new(false))
    }

    /// Linear search from nonce 0 for the first hash below the target.
    pub fn run_with_cancel(&self, block: &Block, cancel: &AtomicBool) -> Result<(i64, Vec<u8>)> {
        let pre_block_hash = block.get_pre_block_hash();
        let transactions_digest = block.hash_transactions();
        let timestamp = block.get_timestamp();

        let mut nonce = 0;
        while nonce < self.max_nonce {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                warn!("Proof-of-work cancelled at nonce {nonce}");
                return Err(LedgerError::Cancelled);
            }

            let data = Block::header_bytes(
                pre_block_hash,
                &transactions_digest,
                timestamp,
                self.difficulty_bits,
                nonce,
            );
            let hash = sha256_digest(data.as_slice());
            if self.meets_target(&hash) {
                debug!("Found nonce {nonce} after {} attempts", nonce + 1);
                return Ok((nonce, hash));
            }
            nonce += 1;
        }

        Err(LedgerError::ProofExhausted {
            max_nonce: self.max_nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::SUBSIDY;
    use crate::core::Transaction;

    fn create_test_block(difficulty: u32) -> Block {
        let coinbase_tx = Transaction::new_coinbase_tx("alice", "", SUBSIDY).unwrap();
        Block::new_block(vec![], &[coinbase_tx], &ProofOfWork::new(difficulty)).unwrap()
    }

    #[test]
    fn test_target_has_leading_zero_bits() {
        let pow = ProofOfWork::new(16);
        let mut expected = BigUint::from(1u32);
        expected.shl_assign(240u32);
        assert_eq!(pow.get_target(), &expected);

        let mut below = vec![0x00, 0x00];
        below.extend(vec![0xFF; 30]);
        assert!(pow.meets_target(&below));

        let mut above = vec![0x00, 0x01];
        above.extend(vec![0x00; 30]);
        assert!(!pow.meets_target(&above));
    }

    #[test]
    fn test_mined_block_validates() {
        let block = create_test_block(8);
        let pow = ProofOfWork::new(8);

        assert!(pow.validate(&block));
        assert!(BigUint::from_bytes_be(block.get_hash()) < *pow.get_target());
        assert_eq!(block.get_hash()[0], 0);
    }

    #[test]
    fn test_search_returns_first_satisfying_nonce() {
        let block = create_test_block(8);
        let pow = ProofOfWork::new(8);

        for nonce in 0..block.get_nonce() {
            let hash = sha256_digest(&pow.prepare_data(&block, nonce));
            assert!(!pow.meets_target(&hash));
        }
    }

    #[test]
    fn test_search_is_deterministic() {
        let block = create_test_block(8);
        let pow = ProofOfWork::new(8);
        let (nonce, hash) = pow.run(&block).unwrap();
        assert_eq!(nonce, block.get_nonce());
        assert_eq!(hash.as_slice(), block.get_hash());
    }

    #[test]
    fn test_tampered_nonce_fails_validation() {
        let block = create_test_block(8);
        let tampered = Block::from_parts(
            block.get_timestamp(),
            block.get_transactions().to_vec(),
            block.get_pre_block_hash().to_vec(),
            block.get_hash().to_vec(),
            block.get_nonce() + 1,
        );
        assert!(!ProofOfWork::new(8).validate(&tampered));
    }

    #[test]
    fn test_validation_uses_configured_difficulty() {
        let block = create_test_block(1);
        // A block mined at one difficulty hashes differently under another
        assert!(ProofOfWork::new(1).validate(&block));
        assert!(!ProofOfWork::new(8).validate(&block));
    }

    #[test]
    fn test_higher_difficulty_has_smaller_target() {
        assert!(ProofOfWork::new(12).get_target() < ProofOfWork::new(4).get_target());
    }

    #[test]
    fn test_exhausted_nonce_space() {
        let block = create_test_block(1);
        let pow = ProofOfWork::new(255).with_max_nonce(16);
        assert_eq!(
            pow.run(&block),
            Err(LedgerError::ProofExhausted { max_nonce: 16 })
        );
    }

    #[test]
    fn test_cancelled_search() {
        let block = create_test_block(1);
        let cancel = AtomicBool::new(true);
        let pow = ProofOfWork::new(255);
        assert_eq!(pow.run_with_cancel(&block, &cancel), Err(LedgerError::Cancelled));
    }

    #[test]
    fn test_prepare_data_depends_on_nonce() {
        let block = create_test_block(2);
        let pow = ProofOfWork::new(2);

        let data1 = pow.prepare_data(&block, 12345);
        let data2 = pow.prepare_data(&block, 12345);
        assert_eq!(data1, data2);
        assert_ne!(data1, pow.prepare_data(&block, 54321));
    }
}

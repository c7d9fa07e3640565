// Proof of Work implementation

use crate::core::{Block, BlockHash};
use std::time::{Duration, Instant};

/// Default number of leading zero hex digits a mined hash needs
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Proof of Work miner
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    /// Leading zero hex digits required
    pub difficulty: usize,
}

impl Miner {
    /// Create a new miner with fixed difficulty
    pub fn new(difficulty: usize) -> Self {
        Self { difficulty }
    }

    /// Mine a block in place by incrementing its nonce until the hash meets the target.
    ///
    /// Starts from the block's current nonce and blocks the calling thread until
    /// a hash is found. The same inputs always yield the same nonce.
    pub fn mine(&self, block: &mut Block) -> MiningResult {
        let start_time = Instant::now();
        let mut attempts = 0u64;

        block.hash = block.calculate_hash();
        while !self.meets_target(&block.hash) {
            block.nonce = block.nonce.wrapping_add(1);
            block.hash = block.calculate_hash();
            attempts += 1;

            // Progress indicator every 100k attempts
            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }
        }

        MiningResult {
            nonce: block.nonce,
            hash: block.hash.clone(),
            attempts,
            duration: start_time.elapsed(),
        }
    }

    /// Whether a hash satisfies this miner's difficulty
    #[inline]
    pub fn meets_target(&self, hash: &BlockHash) -> bool {
        hash.has_leading_zeros(self.difficulty)
    }

    /// Verify that a block's stored hash is genuine and satisfies PoW
    pub fn verify(&self, block: &Block) -> bool {
        block.has_valid_hash() && self.meets_target(&block.hash)
    }
}

/// Mining result
#[derive(Debug)]
pub struct MiningResult {
    /// The nonce that was found
    pub nonce: u64,
    /// The resulting hash
    pub hash: BlockHash,
    /// Number of nonces tried past the starting one
    pub attempts: u64,
    /// Time taken
    pub duration: Duration,
}

impl MiningResult {
    /// Calculate hash rate (hashes per second)
    pub fn hash_rate(&self) -> f64 {
        self.attempts as f64 / self.duration.as_secs_f64().max(f64::EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use chrono::{TimeZone, Utc};

    fn candidate() -> Block {
        Block::with_timestamp(
            1,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            vec![Transaction::new("5001", "5002", 10)],
            BlockHash::new("00ab"),
        )
    }

    #[test]
    fn test_mining_meets_difficulty() {
        for difficulty in 0..=3 {
            let miner = Miner::new(difficulty);
            let mut block = candidate();
            let result = miner.mine(&mut block);

            assert!(block.hash.as_str()[..difficulty].chars().all(|c| c == '0'));
            assert_eq!(result.hash, block.hash);
            assert_eq!(result.nonce, block.nonce);
            assert!(miner.verify(&block));
        }
    }

    #[test]
    fn test_mining_is_deterministic() {
        let miner = Miner::new(2);
        let mut a = candidate();
        let mut b = candidate();
        miner.mine(&mut a);
        miner.mine(&mut b);

        assert_eq!(a.nonce, b.nonce);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_verify_rejects_tampered_block() {
        let miner = Miner::new(1);
        let mut block = candidate();
        miner.mine(&mut block);

        block.transactions[0].amount = 1_000;
        assert!(!miner.verify(&block));
    }
}

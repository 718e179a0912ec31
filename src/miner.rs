//! Proof-of-work nonce search.
//!
//! The search is a tight increment-and-rehash loop over a single block. It
//! holds no locks and touches nothing but the block's `nonce` and `hash`,
//! so callers can run it on a worker thread while the chain stays readable.

use crate::blockchain::Block;
use crate::error::{ChainError, Result};
use crate::hashing::{check_difficulty, meets_difficulty};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MiningStats {
    /// Hashes computed, including the one for the starting nonce.
    pub attempts: u64,
    pub elapsed: Duration,
}

impl MiningStats {
    pub fn hash_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            self.attempts as f64
        }
    }
}

/// Seal `block` for `difficulty`. Runs until a satisfying nonce is found.
pub fn seal(block: &mut Block, difficulty: u32) -> Result<MiningStats> {
    let never = AtomicBool::new(false);
    seal_with_cancel(block, difficulty, &never)
}

/// Like [`seal`], but gives up with [`ChainError::SealCancelled`] once
/// `cancel` is set. The block keeps whatever nonce it reached.
pub fn seal_with_cancel(block: &mut Block, difficulty: u32, cancel: &AtomicBool) -> Result<MiningStats> {
    check_difficulty(difficulty)?;
    let start = Instant::now();

    block.hash = block.calculate_hash()?;
    let mut attempts: u64 = 1;

    while !meets_difficulty(&block.hash, difficulty) {
        if cancel.load(Ordering::Relaxed) {
            debug!(index = block.index, attempts, "seal cancelled");
            return Err(ChainError::SealCancelled { index: block.index });
        }
        block.nonce = block
            .nonce
            .checked_add(1)
            .ok_or_else(|| ChainError::HashComputation("Nonce space exhausted".to_string()))?;
        block.hash = block.calculate_hash()?;
        attempts += 1;
    }

    let stats = MiningStats {
        attempts,
        elapsed: start.elapsed(),
    };
    debug!(
        index = block.index,
        nonce = block.nonce,
        attempts,
        hash_rate = stats.hash_rate(),
        "nonce found"
    );
    Ok(stats)
}

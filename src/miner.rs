//! Proof-of-work nonce search

use crate::blockchain::{Block, Sha256Hash};
use crate::error::ChainError;
use tracing::debug;

/// Largest 256-bit value with `difficulty` leading zero bits.
pub fn hash_to_target(difficulty: u32) -> Sha256Hash {
    let mut target = [0xFF; 32];
    let leading_zeros = (difficulty / 8).min(32);
    let partial_bits = difficulty % 8;

    for item in target.iter_mut().take(leading_zeros as usize) {
        *item = 0;
    }

    if leading_zeros < 32 && partial_bits > 0 {
        target[leading_zeros as usize] = 0xFF >> partial_bits;
    }
    target
}

pub fn verify_pow(block: &Block) -> bool {
    block.hash() <= hash_to_target(block.header.difficulty)
}

/// Searches nonces from zero until the header hash meets the block's target.
pub fn mine_block(mut block: Block) -> Result<Block, ChainError> {
    let target = hash_to_target(block.header.difficulty);
    loop {
        if block.hash() <= target {
            debug!(
                height = block.header.height,
                nonce = block.header.nonce,
                "found proof of work"
            );
            return Ok(block);
        }
        block.header.nonce = block.header.nonce.checked_add(1).ok_or_else(|| {
            ChainError::MiningFailed(format!(
                "nonce space exhausted at height {}",
                block.header.height
            ))
        })?;
    }
}

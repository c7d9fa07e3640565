// Chain validation

use crate::core::{Block, BlockHash};
use thiserror::Error;

/// Reasons a block or chain is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Stored hash differs from the recomputed one
    #[error("Block {index} hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        index: u64,
        stored: BlockHash,
        computed: BlockHash,
    },
    /// Block does not point at the hash it should follow
    #[error("Block {index} links to {found}, expected {expected}")]
    BrokenLink {
        index: u64,
        expected: BlockHash,
        found: BlockHash,
    },
    /// Block index is not the successor of its parent
    #[error("Block index {found} does not follow {previous}")]
    UnexpectedIndex { previous: u64, found: u64 },
    /// No block can follow this index
    #[error("Block index {index} has no successor")]
    IndexOverflow { index: u64 },
    /// First block of a chain is not a genesis block
    #[error("Chain starts at block {index} linked to {previous_hash}, not at genesis")]
    MissingGenesis { index: u64, previous_hash: BlockHash },
    /// Candidate chain does not beat the local one
    #[error("Chain of length {candidate} is not longer than local length {local}")]
    NotLonger { candidate: usize, local: usize },
}

/// Check a block's stored hash against its fields
pub fn validate_block_hash(block: &Block) -> Result<(), ValidationError> {
    let computed = block.calculate_hash();
    if block.hash != computed {
        return Err(ValidationError::HashMismatch {
            index: block.index,
            stored: block.hash.clone(),
            computed,
        });
    }
    Ok(())
}

/// Check that `block` is a genuine direct successor of `previous`
pub fn validate_link(previous: &Block, block: &Block) -> Result<(), ValidationError> {
    validate_block_hash(block)?;

    if block.previous_hash != previous.hash {
        return Err(ValidationError::BrokenLink {
            index: block.index,
            expected: previous.hash.clone(),
            found: block.previous_hash.clone(),
        });
    }

    if previous.index.checked_add(1) != Some(block.index) {
        return Err(ValidationError::UnexpectedIndex {
            previous: previous.index,
            found: block.index,
        });
    }

    Ok(())
}

/// Validate a chain: it starts at a genesis block and every adjacent pair links.
///
/// The genesis block's hash is taken as given since it was never mined.
/// Empty and genesis-only chains are valid.
pub fn validate_chain(chain: &[Block]) -> Result<(), ValidationError> {
    if let Some(first) = chain.first() {
        if !first.is_genesis() {
            return Err(ValidationError::MissingGenesis {
                index: first.index,
                previous_hash: first.previous_hash.clone(),
            });
        }
    }

    chain
        .windows(2)
        .try_for_each(|pair| validate_link(&pair[0], &pair[1]))
}

pub fn is_chain_valid(chain: &[Block]) -> bool {
    validate_chain(chain).is_ok()
}

// Storage layer for blocks

mod blockchain_db;
mod memory;

pub use blockchain_db::{BlockRecord, BlockchainDB};
pub use memory::MemoryStore;

use crate::core::Block;
use thiserror::Error;

/// Storage failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Failed to encode or decode block record: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Corrupt block record: {0}")]
    Corrupt(String),
}

/// Persistence port for the ledger.
///
/// Blocks are kept ordered by index. Implementations must make `insert`
/// a no-op for a block whose hash is already stored.
pub trait BlockStore: Send + Sync {
    /// Every stored block, ascending by index
    fn load_all(&self) -> Result<Vec<Block>, StorageError>;

    /// Append one block unless its hash is already present
    fn insert(&self, block: &Block) -> Result<(), StorageError>;

    /// Drop everything and store `chain` instead
    fn clear_and_replace(&self, chain: &[Block]) -> Result<(), StorageError>;
}

impl<S: BlockStore + ?Sized> BlockStore for Box<S> {
    fn load_all(&self) -> Result<Vec<Block>, StorageError> {
        (**self).load_all()
    }

    fn insert(&self, block: &Block) -> Result<(), StorageError> {
        (**self).insert(block)
    }

    fn clear_and_replace(&self, chain: &[Block]) -> Result<(), StorageError> {
        (**self).clear_and_replace(chain)
    }
}

/// A replacement chain must be strictly ascending by index, or rows would overwrite each other
fn check_ascending(chain: &[Block]) -> Result<(), StorageError> {
    match chain.windows(2).find(|pair| pair[1].index <= pair[0].index) {
        Some(pair) => Err(StorageError::Corrupt(format!(
            "Block {} follows block {} in replacement chain",
            pair[1].index, pair[0].index
        ))),
        None => Ok(()),
    }
}

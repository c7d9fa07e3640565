// In-memory block store

use crate::core::Block;
use crate::storage::{check_ascending, BlockStore, StorageError};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-process block store. Clones share the same blocks, so a test can keep a
/// handle and inspect what the ledger persisted.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    blocks: Arc<Mutex<Vec<Block>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `chain`
    pub fn with_blocks(chain: Vec<Block>) -> Self {
        Self {
            blocks: Arc::new(Mutex::new(chain)),
        }
    }

    /// Snapshot of the stored blocks
    pub fn blocks(&self) -> Vec<Block> {
        self.lock().map(|blocks| blocks.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Block>>, StorageError> {
        self.blocks
            .lock()
            .map_err(|_| StorageError::Corrupt("Mutex poisoned".to_string()))
    }
}

impl BlockStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = self.lock()?.clone();
        blocks.sort_by_key(|block| block.index);
        Ok(blocks)
    }

    fn insert(&self, block: &Block) -> Result<(), StorageError> {
        let mut blocks = self.lock()?;
        if blocks.iter().any(|stored| stored.hash == block.hash) {
            return Ok(());
        }
        blocks.retain(|stored| stored.index != block.index);
        blocks.push(block.clone());
        Ok(())
    }

    fn clear_and_replace(&self, chain: &[Block]) -> Result<(), StorageError> {
        check_ascending(chain)?;
        let mut blocks = self.lock()?;
        *blocks = chain.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_skips_known_hash() {
        let store = MemoryStore::new();
        let genesis = Block::genesis();

        store.insert(&genesis).unwrap();
        store.insert(&genesis).unwrap();

        assert_eq!(store.load_all().unwrap(), vec![genesis]);
    }

    #[test]
    fn test_unordered_replacement_keeps_old_blocks() {
        let genesis = Block::genesis();
        let store = MemoryStore::with_blocks(vec![genesis.clone()]);

        let result = store.clear_and_replace(&[genesis.clone(), genesis.clone()]);

        assert!(matches!(result, Err(StorageError::Corrupt(_))));
        assert_eq!(store.blocks(), vec![genesis]);
    }

    #[test]
    fn test_clones_share_blocks() {
        let store = MemoryStore::new();
        let handle = store.clone();
        store.insert(&Block::genesis()).unwrap();

        assert_eq!(handle.blocks().len(), 1);
    }
}

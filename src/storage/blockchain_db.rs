// Blockchain database using sled

use crate::core::{timestamp_format, Block, BlockHash, Transaction};
use crate::storage::{check_ascending, BlockStore, StorageError};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Batch, Db, Tree};
use std::path::Path;

/// One stored row: the block's columns, transactions kept as a JSON string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub index: u64,
    pub timestamp: String,
    pub transactions: String,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl BlockRecord {
    pub fn from_block(block: &Block) -> Result<Self, StorageError> {
        Ok(Self {
            index: block.index,
            timestamp: timestamp_format::encode(&block.timestamp),
            transactions: serde_json::to_string(&block.transactions)?,
            previous_hash: block.previous_hash.to_string(),
            nonce: block.nonce,
            hash: block.hash.to_string(),
        })
    }

    pub fn into_block(self) -> Result<Block, StorageError> {
        let timestamp = timestamp_format::decode(&self.timestamp).map_err(StorageError::Corrupt)?;
        let transactions: Vec<Transaction> = serde_json::from_str(&self.transactions)?;

        Ok(Block {
            index: self.index,
            timestamp,
            transactions,
            previous_hash: BlockHash::new(self.previous_hash),
            nonce: self.nonce,
            hash: BlockHash::new(self.hash),
        })
    }
}

/// Blockchain database
///
/// The default tree maps big-endian block index to a [`BlockRecord`], so a
/// scan returns blocks in chain order. The `hashes` tree maps block hash to
/// index and makes inserts idempotent.
pub struct BlockchainDB {
    db: Db,
    hashes: Tree,
}

impl BlockchainDB {
    /// Open (or create) a blockchain database
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create an in-memory database (for testing)
    pub fn memory() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let hashes = db.open_tree("hashes")?;
        Ok(Self { db, hashes })
    }

    /// Number of stored blocks
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Check if a block exists
    pub fn has_block(&self, hash: &BlockHash) -> Result<bool, StorageError> {
        Ok(self.hashes.contains_key(hash.as_str().as_bytes())?)
    }

    /// Get block by index
    pub fn get_block(&self, index: u64) -> Result<Option<Block>, StorageError> {
        match self.db.get(Self::index_key(index))? {
            Some(data) => {
                let record: BlockRecord = serde_json::from_slice(&data)?;
                Ok(Some(record.into_block()?))
            }
            None => Ok(None),
        }
    }

    fn write_block(&self, block: &Block) -> Result<(), StorageError> {
        let record = serde_json::to_vec(&BlockRecord::from_block(block)?)?;

        // A different block at this index loses its hash entry
        if let Some(previous) = self.db.insert(Self::index_key(block.index), record)? {
            let previous: BlockRecord = serde_json::from_slice(&previous)?;
            self.hashes.remove(previous.hash.as_bytes())?;
        }
        self.hashes
            .insert(block.hash.as_str().as_bytes(), &Self::index_key(block.index)[..])?;

        Ok(())
    }

    // Helper: key for block storage, big-endian so iteration follows the chain
    fn index_key(index: u64) -> [u8; 8] {
        index.to_be_bytes()
    }
}

impl BlockStore for BlockchainDB {
    fn load_all(&self) -> Result<Vec<Block>, StorageError> {
        self.db
            .iter()
            .map(|entry| {
                let (_, data) = entry?;
                let record: BlockRecord = serde_json::from_slice(&data)?;
                record.into_block()
            })
            .collect()
    }

    fn insert(&self, block: &Block) -> Result<(), StorageError> {
        if self.has_block(&block.hash)? {
            log::debug!("Block {} already stored", block.hash.short());
            return Ok(());
        }
        self.write_block(block)?;
        self.db.flush()?;
        Ok(())
    }

    /// Both trees are rewritten in one transaction: either the whole new chain
    /// is stored or the old one is left untouched.
    fn clear_and_replace(&self, chain: &[Block]) -> Result<(), StorageError> {
        check_ascending(chain)?;

        let mut blocks = Batch::default();
        let mut hashes = Batch::default();
        for key in self.db.iter().keys() {
            blocks.remove(key?);
        }
        for key in self.hashes.iter().keys() {
            hashes.remove(key?);
        }
        for block in chain {
            let key = Self::index_key(block.index);
            blocks.insert(&key[..], serde_json::to_vec(&BlockRecord::from_block(block)?)?);
            hashes.insert(block.hash.as_str().as_bytes(), &key[..]);
        }

        let tree: &Tree = &self.db;
        (tree, &self.hashes)
            .transaction(|(blocks_tx, hashes_tx)| {
                blocks_tx.apply_batch(&blocks)?;
                hashes_tx.apply_batch(&hashes)?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => StorageError::Database(e),
                TransactionError::Abort(()) => StorageError::Corrupt("Chain rewrite aborted".to_string()),
            })?;

        self.db.flush()?;
        Ok(())
    }
}

// Gossip Coin
// Minimal proof-of-work ledger replicated over a TCP gossip network

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod error;
pub mod ledger;
pub mod network;
pub mod storage;

// Re-exports for convenience
pub use crate::cli::{Cli, CommandHandler};
pub use crate::config::NodeConfig;
pub use crate::consensus::{Miner, ValidationError};
pub use crate::core::{Address, Amount, Balance, Block, BlockHash, Transaction};
pub use crate::error::{Error, Result};
pub use crate::ledger::{BalanceTable, Chain};
pub use crate::network::{Message, Node, NodeEvent, PeerAddr};
pub use crate::storage::{BlockStore, BlockchainDB, MemoryStore, StorageError};

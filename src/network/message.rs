// Network protocol messages

use crate::core::{Block, Transaction};
use crate::network::PeerAddr;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Wire and transport failures
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Undecodable message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Message exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Network message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    NewPeer,
    GetPeers,
    PeerList,
    NewBlock,
    Chain,
    NewTransaction,
    PendingTransactions,
}

impl MessageType {
    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::NewPeer => "NEW_PEER",
            MessageType::GetPeers => "GET_PEERS",
            MessageType::PeerList => "PEER_LIST",
            MessageType::NewBlock => "NEW_BLOCK",
            MessageType::Chain => "CHAIN",
            MessageType::NewTransaction => "NEW_TRANSACTION",
            MessageType::PendingTransactions => "PENDING_TRANSACTIONS",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network message.
///
/// One JSON object per connection, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Sender announces itself; the receiver replies with its chain and pending queue
    NewPeer { host: String, port: u16 },
    /// Ask for the receiver's peer set, delivered to `host:port`
    GetPeers { host: String, port: u16 },
    PeerList { peers: Vec<PeerAddr> },
    NewBlock { block: Block },
    Chain { chain: Vec<Block> },
    NewTransaction { transaction: Transaction },
    PendingTransactions { transactions: Vec<Transaction> },
}

impl Message {
    /// Get message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::NewPeer { .. } => MessageType::NewPeer,
            Message::GetPeers { .. } => MessageType::GetPeers,
            Message::PeerList { .. } => MessageType::PeerList,
            Message::NewBlock { .. } => MessageType::NewBlock,
            Message::Chain { .. } => MessageType::Chain,
            Message::NewTransaction { .. } => MessageType::NewTransaction,
            Message::PendingTransactions { .. } => MessageType::PendingTransactions,
        }
    }

    /// Serialize message to bytes
    pub fn serialize(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize message from bytes. Unknown `type` tags are decode errors.
    pub fn deserialize(data: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(data)?)
    }
}

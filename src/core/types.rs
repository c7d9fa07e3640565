// Basic types for the ledger

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier. A node's listening port, or the genesis sentinel.
pub type Address = String;

/// Transferred quantity
pub type Amount = u64;

/// Largest amount the ledger admits. Anything above it cannot be represented
/// as a [`Balance`]; replay of such a block clamps the credit to `Balance::MAX`.
pub const MAX_AMOUNT: Amount = Balance::MAX as Amount;

/// Derived account balance. Replay never reconciles overdrafts, so it is signed.
pub type Balance = i64;

/// Sender of the bootstrap allocation; never debited
pub const GENESIS_SENDER: &str = "genesis";

/// Lowercase hex SHA-256 digest of a block.
/// The genesis block links to the literal `"0"` instead of a real digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl BlockHash {
    /// Wrap an already-encoded hex digest
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Parent hash of the genesis block
    pub fn genesis_parent() -> Self {
        Self("0".to_string())
    }

    /// Create from raw digest bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the hex form starts with `difficulty` zero digits
    pub fn has_leading_zeros(&self, difficulty: usize) -> bool {
        self.0.len() >= difficulty && self.0.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// Short form for log lines
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

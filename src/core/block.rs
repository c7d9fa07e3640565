// Block data structure

use crate::core::{fingerprint, sha256_hex, Amount, BlockHash, Transaction, GENESIS_SENDER};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Bootstrap allocation credited by the genesis block
pub const GENESIS_ALLOCATION: [(&str, Amount); 4] =
    [("5001", 100), ("5002", 100), ("5003", 100), ("5004", 100)];

/// A block of transactions linked to its predecessor by hash.
///
/// `hash` is stored, not derived on access: a received block keeps the hash
/// its miner published, and validation compares it with [`Block::calculate_hash`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, genesis is 0
    pub index: u64,
    /// Creation time, microsecond precision
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    pub previous_hash: BlockHash,
    /// Proof-of-work counter
    pub nonce: u64,
    pub hash: BlockHash,
}

impl Block {
    /// Create an unmined block stamped with the current time
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: BlockHash) -> Self {
        Self::with_timestamp(index, Utc::now(), transactions, previous_hash)
    }

    /// Create an unmined block with an explicit timestamp
    pub fn with_timestamp(
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: BlockHash,
    ) -> Self {
        let mut block = Self {
            index,
            // The wire format carries microseconds; anything finer would not survive a round trip
            timestamp: timestamp.trunc_subsecs(6),
            transactions,
            previous_hash,
            nonce: 0,
            hash: BlockHash::default(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Create the genesis block with the bootstrap allocation.
    /// It is never mined.
    pub fn genesis() -> Self {
        let transactions = GENESIS_ALLOCATION
            .iter()
            .map(|(recipient, amount)| Transaction::new(GENESIS_SENDER, *recipient, *amount))
            .collect();

        Self::new(0, transactions, BlockHash::genesis_parent())
    }

    /// Byte-stable encoding of every hashed field, in order:
    /// index, timestamp, transactions, previous hash, nonce.
    /// Changing it invalidates every block mined so far.
    pub fn hash_preimage(&self) -> String {
        let transactions = format!(
            "[{}]",
            self.transactions
                .iter()
                .map(Transaction::canonical_json)
                .collect::<Vec<_>>()
                .join(",")
        );

        format!(
            "{}{}{}{}{}",
            self.index,
            timestamp_format::encode(&self.timestamp),
            transactions,
            self.previous_hash,
            self.nonce
        )
    }

    /// Recompute the hash from the block's fields
    pub fn calculate_hash(&self) -> BlockHash {
        sha256_hex(self.hash_preimage().as_bytes())
    }

    /// Whether the stored hash matches the fields
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == BlockHash::genesis_parent()
    }

    /// Dedup key for `NEW_BLOCK` gossip. Covers the stored hash too, so a
    /// tampered copy is not mistaken for one already seen.
    pub fn fingerprint(&self) -> String {
        fingerprint(format!("{}{}", self.hash_preimage(), self.hash).as_bytes())
    }
}

/// ISO-8601 timestamps, e.g. `2024-05-01T12:30:00.123456Z`
pub mod timestamp_format {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn encode(timestamp: &DateTime<Utc>) -> String {
        timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Accepts RFC 3339 and offset-less ISO-8601, which is read as UTC
    pub fn decode(s: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("Invalid timestamp {}: {}", s, e))
    }

    pub fn serialize<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(timestamp))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode(&s).map_err(de::Error::custom)
    }
}

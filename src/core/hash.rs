// Hashing utilities

use crate::core::BlockHash;
use sha2::{Digest, Sha256};

/// SHA-256 of `data` as a lowercase hex digest
pub fn sha256_hex(data: &[u8]) -> BlockHash {
    BlockHash::from_bytes(&Sha256::digest(data))
}

/// Content fingerprint used to recognise already-processed gossip
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// Transaction data structure

use crate::core::{fingerprint, Address, Amount, GENESIS_SENDER};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Transfer of `amount` from `sender` to `recipient`.
/// Identity is field-wise content; there are no signatures or fees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    pub amount: Amount,
}

impl Transaction {
    pub fn new(sender: impl Into<Address>, recipient: impl Into<Address>, amount: Amount) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// Whether this transaction belongs to the bootstrap allocation
    pub fn is_genesis(&self) -> bool {
        self.sender == GENESIS_SENDER
    }

    /// Compact JSON with the fields in declared order, exactly as
    /// `serde_json::to_string` writes this struct. Used inside the block hash
    /// preimage, so the bytes must never change.
    pub fn canonical_json(&self) -> String {
        format!(
            r#"{{"sender":{},"recipient":{},"amount":{}}}"#,
            Value::from(self.sender.as_str()),
            Value::from(self.recipient.as_str()),
            self.amount
        )
    }

    /// Dedup key for `NEW_TRANSACTION` gossip
    pub fn fingerprint(&self) -> String {
        fingerprint(self.canonical_json().as_bytes())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.sender, self.recipient, self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_json_is_stable() {
        let tx = Transaction::new("5001", "5002", 40);
        assert_eq!(
            tx.canonical_json(),
            r#"{"sender":"5001","recipient":"5002","amount":40}"#
        );
    }

    #[test]
    fn test_canonical_json_matches_wire_form() {
        let tx = Transaction::new("a \"quoted\" name", "caf\u{e9}\n", u64::MAX);
        assert_eq!(tx.canonical_json(), serde_json::to_string(&tx).unwrap());
    }

    #[test]
    fn test_fingerprint_by_content() {
        let a = Transaction::new("5001", "5002", 40);
        let b = Transaction::new("5001", "5002", 40);
        let c = Transaction::new("5001", "5002", 41);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_is_genesis() {
        assert!(Transaction::new(GENESIS_SENDER, "5001", 100).is_genesis());
        assert!(!Transaction::new("5001", "5002", 1).is_genesis());
    }

    #[test]
    fn test_wire_field_names() {
        let tx: Transaction =
            serde_json::from_str(r#"{"sender":"5003","recipient":"5004","amount":7}"#).unwrap();
        assert_eq!(tx, Transaction::new("5003", "5004", 7));
    }
}

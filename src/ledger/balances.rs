// Balance table derived from the chain

use crate::core::{Address, Amount, Balance, Block, Transaction};
use std::collections::HashMap;

/// Address balances obtained by replaying committed transactions.
///
/// Genesis transactions only credit their recipient. Every other transaction
/// debits the sender and credits the recipient, even into negative balances.
/// A full [`BalanceTable::replay`] and block-by-block [`BalanceTable::apply_block`]
/// always produce the same table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceTable {
    balances: HashMap<Address, Balance>,
}

impl BalanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from scratch
    pub fn replay(chain: &[Block]) -> Self {
        let mut table = Self::new();
        for block in chain {
            table.apply_block(block);
        }
        table
    }

    /// Apply a block that has been committed to the chain
    pub fn apply_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            self.apply_transaction(tx);
        }
    }

    fn apply_transaction(&mut self, tx: &Transaction) {
        let amount = to_balance(tx.amount);
        if !tx.is_genesis() {
            let sender = self.balances.entry(tx.sender.clone()).or_default();
            *sender = sender.saturating_sub(amount);
        }
        let recipient = self.balances.entry(tx.recipient.clone()).or_default();
        *recipient = recipient.saturating_add(amount);
    }

    /// Balance of `address`, 0 when it never appeared
    pub fn get(&self, address: &str) -> Balance {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Whether `address` can cover `amount`
    pub fn covers(&self, address: &str, amount: Amount) -> bool {
        self.get(address) >= to_balance(amount)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Balance)> {
        self.balances.iter()
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

// Admission caps amounts at MAX_AMOUNT, so only a foreign block can clamp here
fn to_balance(amount: Amount) -> Balance {
    Balance::try_from(amount).unwrap_or(Balance::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BlockHash, GENESIS_SENDER};

    fn block(index: u64, transactions: Vec<Transaction>) -> Block {
        Block::new(index, transactions, BlockHash::new(format!("parent-{}", index)))
    }

    #[test]
    fn test_genesis_bootstrap() {
        let table = BalanceTable::replay(&[Block::genesis()]);

        for port in ["5001", "5002", "5003", "5004"] {
            assert_eq!(table.get(port), 100);
        }
        assert_eq!(table.get(GENESIS_SENDER), 0);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_unknown_address_is_zero() {
        assert_eq!(BalanceTable::new().get("9999"), 0);
    }

    #[test]
    fn test_transfer_debits_and_credits() {
        let chain = vec![
            Block::genesis(),
            block(1, vec![Transaction::new("5001", "5002", 40)]),
        ];
        let table = BalanceTable::replay(&chain);

        assert_eq!(table.get("5001"), 60);
        assert_eq!(table.get("5002"), 140);
    }

    #[test]
    fn test_replay_allows_negative_balances() {
        let table = BalanceTable::replay(&[block(1, vec![Transaction::new("7000", "7001", 30)])]);

        assert_eq!(table.get("7000"), -30);
        assert!(!table.covers("7000", 1));
        assert!(table.covers("7001", 30));
    }

    #[test]
    fn test_oversized_amount_clamps() {
        let table = BalanceTable::replay(&[block(1, vec![Transaction::new(GENESIS_SENDER, "7000", u64::MAX)])]);
        assert_eq!(table.get("7000"), Balance::MAX);
    }

    #[test]
    fn test_incremental_matches_replay() {
        let chain = vec![
            Block::genesis(),
            block(1, vec![Transaction::new("5001", "5002", 40), Transaction::new("5002", "5003", 15)]),
            block(2, vec![Transaction::new(GENESIS_SENDER, "5005", 7)]),
            block(3, vec![Transaction::new("5003", "5001", 115)]),
        ];

        let mut incremental = BalanceTable::new();
        for b in &chain {
            incremental.apply_block(b);
        }

        assert_eq!(incremental, BalanceTable::replay(&chain));
    }
}

// Ledger engine: chain, pending queue and balances

use crate::consensus::{validate_chain, validate_link, Miner, MiningResult, ValidationError};
use crate::core::{Amount, Balance, Block, Transaction, GENESIS_SENDER, MAX_AMOUNT};
use crate::error::Result;
use crate::ledger::BalanceTable;
use crate::storage::{BlockStore, StorageError};
use std::collections::HashSet;

/// A node's ledger.
///
/// Owns the block sequence, the pending transaction queue and the balance
/// table derived from the blocks. Every mutation keeps the three consistent
/// and writes through to the block store before it becomes visible.
pub struct Chain {
    blocks: Vec<Block>,
    pending: Vec<Transaction>,
    balances: BalanceTable,
    miner: Miner,
    store: Box<dyn BlockStore>,
}

impl Chain {
    /// Load the persisted chain, creating and storing the genesis block when the
    /// store is empty, then derive balances by full replay.
    pub fn new(difficulty: usize, store: impl BlockStore + 'static) -> std::result::Result<Self, StorageError> {
        let mut blocks = store.load_all()?;

        if blocks.is_empty() {
            let genesis = Block::genesis();
            store.insert(&genesis)?;
            log::info!("Created genesis block {}", genesis.hash.short());
            blocks.push(genesis);
        } else if let Err(e) = validate_chain(&blocks) {
            log::warn!("Stored chain does not validate: {}", e);
        }

        let balances = BalanceTable::replay(&blocks);
        log::info!("Loaded chain of {} blocks (difficulty {})", blocks.len(), difficulty);

        Ok(Self {
            blocks,
            pending: Vec::new(),
            balances,
            miner: Miner::new(difficulty),
            store: Box::new(store),
        })
    }

    /// Queue a transaction if the sender's derived balance covers it.
    ///
    /// Only committed balances count: queued spends are not deducted, so two
    /// queued transactions may together exceed the balance.
    pub fn add_transaction(&mut self, sender: &str, recipient: &str, amount: Amount) -> bool {
        if amount > MAX_AMOUNT {
            log::warn!("Transaction {} -> {} rejected: amount {} too large", sender, recipient, amount);
            return false;
        }
        if sender != GENESIS_SENDER && !self.balances.covers(sender, amount) {
            log::warn!(
                "Transaction {} -> {} of {} rejected: insufficient balance ({})",
                sender,
                recipient,
                amount,
                self.balances.get(sender)
            );
            return false;
        }

        let tx = Transaction::new(sender, recipient, amount);
        log::info!("Transaction added: {}", tx);
        self.pending.push(tx);
        true
    }

    /// Mine every pending transaction into a new block on top of the tail.
    ///
    /// Returns `None` when nothing is pending. Blocks the calling thread for
    /// the whole proof-of-work search.
    pub fn mine_pending(&mut self) -> Result<Option<Block>> {
        if self.pending.is_empty() {
            log::info!("No transactions to mine");
            return Ok(None);
        }

        let tail = self.latest_block();
        let index = tail
            .index
            .checked_add(1)
            .ok_or(ValidationError::IndexOverflow { index: tail.index })?;
        let mut block = Block::new(index, self.pending.clone(), tail.hash.clone());
        let result = self.mine_block(&mut block);
        log::info!(
            "Mined block {} ({}) after {} attempts in {:?} ({:.0} H/s)",
            block.index,
            block.hash,
            result.attempts,
            result.duration,
            result.hash_rate()
        );

        self.store.insert(&block)?;
        self.pending.clear();
        self.commit(block.clone());
        Ok(Some(block))
    }

    /// Proof-of-work at this chain's difficulty
    pub fn mine_block(&self, block: &mut Block) -> MiningResult {
        self.miner.mine(block)
    }

    /// Hash and linkage check of a candidate chain
    pub fn is_chain_valid(&self, candidate: &[Block]) -> bool {
        validate_chain(candidate).is_ok()
    }

    /// Adopt `candidate` if it is strictly longer than the local chain and valid.
    /// On success the store is rewritten and balances are rebuilt.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<bool> {
        if candidate.len() <= self.blocks.len() {
            log::info!(
                "{}",
                ValidationError::NotLonger {
                    candidate: candidate.len(),
                    local: self.blocks.len()
                }
            );
            return Ok(false);
        }

        if let Err(e) = validate_chain(&candidate) {
            log::warn!("Rejected received chain: {}", e);
            return Ok(false);
        }

        self.store.clear_and_replace(&candidate)?;

        let known: HashSet<_> = self.blocks.iter().map(|b| b.hash.clone()).collect();
        let adopted: Vec<Block> = candidate
            .iter()
            .filter(|b| !known.contains(&b.hash))
            .cloned()
            .collect();
        self.prune_pending(&adopted);

        self.balances = BalanceTable::replay(&candidate);
        self.blocks = candidate;
        log::info!(
            "Chain replaced: now {} blocks, tip {}",
            self.blocks.len(),
            self.latest_block().hash.short()
        );
        Ok(true)
    }

    /// Append a block mined elsewhere, exactly as received.
    ///
    /// It must carry its genuine hash and extend the current tail. Anything
    /// else is refused whole; a peer that is ahead or forked has to deliver
    /// its full chain for [`Chain::replace_chain`].
    pub fn append_received_block(&mut self, block: Block) -> Result<()> {
        validate_link(self.latest_block(), &block)?;

        self.store.insert(&block)?;
        self.prune_pending(std::slice::from_ref(&block));
        log::info!("Accepted block {} ({})", block.index, block.hash.short());
        self.commit(block);
        Ok(())
    }

    /// Balance of `address`, 0 if unknown
    pub fn get_balance(&self, address: &str) -> Balance {
        self.balances.get(address)
    }

    /// Add peer-supplied pending transactions without a balance check.
    /// Transactions already queued, or with an amount above [`MAX_AMOUNT`],
    /// are skipped. Returns how many were added.
    pub fn merge_pending(&mut self, transactions: Vec<Transaction>) -> usize {
        let mut added = 0;
        for tx in transactions {
            if tx.amount <= MAX_AMOUNT && !self.pending.contains(&tx) {
                self.pending.push(tx);
                added += 1;
            }
        }
        added
    }

    // Tail and balances advance together
    fn commit(&mut self, block: Block) {
        self.balances.apply_block(&block);
        self.blocks.push(block);
    }

    // Drop one queued copy of each transaction the blocks already contain
    fn prune_pending(&mut self, blocks: &[Block]) {
        for tx in blocks.iter().flat_map(|b| &b.transactions) {
            if let Some(pos) = self.pending.iter().position(|queued| queued == tx) {
                self.pending.remove(pos);
            }
        }
    }

    /// The tail block. A chain always holds at least genesis.
    pub fn latest_block(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn balances(&self) -> &BalanceTable {
        &self.balances
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> usize {
        self.miner.difficulty
    }
}

use crate::error::{ChainError, Result};
use crate::hashing::{canonical_hash, check_difficulty, meets_difficulty};
use crate::miner::{self, MiningStats};
use crate::transaction::{unix_timestamp, Payload, Record, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, warn};

use super::state::LedgerState;
use super::validation::{validate_chain, ChainIssue};

/// Difficulty the ledger starts with unless configured otherwise.
pub const DEFAULT_DIFFICULTY: u32 = 2;

/// `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub transactions: Vec<Transaction>,
    pub timestamp: f64,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

/// The fields covered by a block's hash.
#[derive(Serialize)]
struct HashInput<'a> {
    index: u64,
    transactions: &'a [Transaction],
    timestamp: f64,
    previous_hash: &'a str,
    nonce: u64,
}

/// What a seal hands back to callers that do not need the transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub index: u64,
    pub hash: String,
    pub previous_hash: String,
    pub timestamp: f64,
    pub transaction_count: usize,
}

impl Block {
    /// Build an unsealed block with nonce 0 and its hash already computed.
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        timestamp: f64,
        previous_hash: impl Into<String>,
    ) -> Result<Self> {
        let mut block = Block {
            index,
            transactions,
            timestamp,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash()?;
        Ok(block)
    }

    pub fn genesis(timestamp: f64) -> Result<Self> {
        Block::new(0, Vec::new(), timestamp, GENESIS_PREVIOUS_HASH)
    }

    /// Hash of the block's current fields. Pure; compare against `hash` to
    /// detect tampering.
    pub fn calculate_hash(&self) -> Result<String> {
        canonical_hash(&HashInput {
            index: self.index,
            transactions: &self.transactions,
            timestamp: self.timestamp,
            previous_hash: &self.previous_hash,
            nonce: self.nonce,
        })
    }

    /// Search nonces from the current one until the hash has `difficulty`
    /// leading zeros.
    pub fn seal(&mut self, difficulty: u32) -> Result<MiningStats> {
        miner::seal(self, difficulty)
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            index: self.index,
            hash: self.hash.clone(),
            previous_hash: self.previous_hash.clone(),
            timestamp: self.timestamp,
            transaction_count: self.transactions.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    pub height: u64,
    pub blocks: usize,
    pub pending_transactions: usize,
    pub sealed_transactions: usize,
    pub difficulty: u32,
}

/// The chain manager: a genesis-anchored, append-only list of blocks plus
/// the pool of transactions waiting for the next seal.
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    difficulty: u32,
}

impl Ledger {
    pub fn new(difficulty: u32) -> Result<Self> {
        Self::with_genesis_timestamp(difficulty, unix_timestamp())
    }

    /// Create a ledger whose genesis block carries a fixed timestamp.
    /// Genesis is an anchor and is not mined.
    pub fn with_genesis_timestamp(difficulty: u32, timestamp: f64) -> Result<Self> {
        let difficulty = check_difficulty(difficulty)?;
        Ok(Ledger {
            chain: vec![Block::genesis(timestamp)?],
            pending: Vec::new(),
            difficulty,
        })
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn genesis(&self) -> &Block {
        &self.chain[0]
    }

    pub fn latest_block(&self) -> &Block {
        // The chain always holds at least the genesis block.
        &self.chain[self.chain.len() - 1]
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    pub fn height(&self) -> u64 {
        self.latest_block().index
    }

    /// Queue a record for the next seal. Sender and recipient are taken as
    /// given; authorization is the caller's business.
    pub fn add_transaction(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: Payload,
    ) {
        self.push_transaction(Transaction::new(sender, recipient, payload));
    }

    pub fn push_transaction(&mut self, tx: Transaction) {
        debug!(sender = %tx.sender, recipient = %tx.recipient, "transaction queued");
        self.pending.push(tx);
    }

    /// Take the whole pending pool and wrap it in an unsealed block on top of
    /// the current tip. The pool is empty afterwards.
    pub fn prepare_candidate(&mut self) -> Result<Block> {
        let transactions = std::mem::take(&mut self.pending);
        if transactions.is_empty() {
            debug!(index = self.chain.len(), "preparing an empty block");
        }
        let index = self.chain.len() as u64;
        let previous_hash = self.latest_block().hash.clone();

        let mut block = Block {
            index,
            transactions,
            timestamp: unix_timestamp(),
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        match block.calculate_hash() {
            Ok(hash) => {
                block.hash = hash;
                Ok(block)
            }
            Err(e) => {
                warn!(index, error = %e, "failed to build candidate block");
                self.return_pending(block.transactions);
                Err(e)
            }
        }
    }

    /// Append a sealed candidate. Fails with `StaleChainTip` when the chain
    /// moved since the candidate was prepared.
    pub fn append_sealed(&mut self, block: Block) -> Result<&Block> {
        let tip = self.latest_block();
        let expected_index = self.chain.len() as u64;
        if block.previous_hash != tip.hash || block.index != expected_index {
            return Err(ChainError::StaleChainTip {
                expected: tip.hash.clone(),
                found: block.previous_hash,
            });
        }

        if block.calculate_hash()? != block.hash {
            return Err(ChainError::InvalidBlock(format!(
                "Block {} hash does not match its contents",
                block.index
            )));
        }
        if !block.meets_difficulty(self.difficulty) {
            return Err(ChainError::InvalidBlock(format!(
                "Block {} hash {} does not meet difficulty {}",
                block.index, block.hash, self.difficulty
            )));
        }

        self.chain.push(block);
        Ok(self.latest_block())
    }

    /// Put the transactions of an abandoned candidate back in front of
    /// anything queued since, keeping their original order.
    pub fn return_pending(&mut self, mut transactions: Vec<Transaction>) {
        transactions.append(&mut self.pending);
        self.pending = transactions;
    }

    /// Seal every pending transaction into a new block and append it.
    /// An empty pool still produces an (empty) block.
    pub fn seal_pending_block(&mut self) -> Result<Block> {
        self.seal_pending_block_with_cancel(&AtomicBool::new(false))
    }

    pub fn seal_pending_block_with_cancel(&mut self, cancel: &AtomicBool) -> Result<Block> {
        let mut candidate = self.prepare_candidate()?;
        let stats = match miner::seal_with_cancel(&mut candidate, self.difficulty, cancel) {
            Ok(stats) => stats,
            Err(e) => {
                self.return_pending(candidate.transactions);
                return Err(e);
            }
        };

        let block = self.append_sealed(candidate)?.clone();
        info!(
            index = block.index,
            hash = %block.hash,
            transactions = block.transactions.len(),
            attempts = stats.attempts,
            "block sealed"
        );
        Ok(block)
    }

    /// Every record addressed to `recipient`, oldest first.
    pub fn records_for(&self, recipient: &str) -> Vec<Record> {
        self.chain
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|tx| tx.is_addressed_to(recipient))
            .map(Transaction::to_record)
            .collect()
    }

    /// True when every non-genesis block still hashes to its stored hash and
    /// links to its predecessor.
    pub fn validate(&self) -> bool {
        let issues = self.validation_report();
        if !issues.is_empty() {
            warn!(issues = issues.len(), first = %issues[0], "chain failed validation");
        }
        issues.is_empty()
    }

    pub fn validation_report(&self) -> Vec<ChainIssue> {
        validate_chain(&self.chain)
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            height: self.height(),
            blocks: self.chain.len(),
            pending_transactions: self.pending.len(),
            sealed_transactions: self.chain.iter().map(Block::transaction_count).sum(),
            difficulty: self.difficulty,
        }
    }

    pub fn state(&self) -> LedgerState {
        LedgerState {
            chain: self.chain.clone(),
            pending_transactions: self.pending.clone(),
            difficulty: self.difficulty,
        }
    }

    /// Rebuild a ledger from a snapshot. Structurally unusable snapshots are
    /// rejected; a tampered chain loads as-is and shows up in `validate`.
    pub fn from_state(state: LedgerState) -> Result<Self> {
        state.check_structure()?;
        let ledger = Ledger {
            chain: state.chain,
            pending: state.pending_transactions,
            difficulty: state.difficulty,
        };
        info!(
            blocks = ledger.chain.len(),
            pending = ledger.pending.len(),
            difficulty = ledger.difficulty,
            "ledger restored"
        );
        if !ledger.validate() {
            warn!("restored ledger does not validate");
        }
        Ok(ledger)
    }
}

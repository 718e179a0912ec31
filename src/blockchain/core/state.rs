use crate::error::{ChainError, Result};
use crate::hashing::{canonical_json, check_difficulty};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

use super::chain::Block;

/// Everything a ledger is: its chain, its pending pool and its difficulty.
/// Saving and restoring this triple is all persistence needs to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
    pub difficulty: u32,
}

impl LedgerState {
    /// Reject snapshots no ledger could be built from.
    pub fn check_structure(&self) -> Result<()> {
        let genesis = self
            .chain
            .first()
            .ok_or_else(|| ChainError::InvalidSnapshot("Chain has no genesis block".to_string()))?;
        if genesis.index != 0 {
            return Err(ChainError::InvalidSnapshot(format!(
                "First block has index {}, expected 0",
                genesis.index
            )));
        }
        check_difficulty(self.difficulty)
            .map_err(|e| ChainError::InvalidSnapshot(e.to_string()))?;
        Ok(())
    }

    pub fn to_canonical_json(&self) -> Result<String> {
        canonical_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Ledger;
    use crate::transaction::payload_from;

    #[test]
    fn test_canonical_json_round_trips() {
        let mut ledger = Ledger::with_genesis_timestamp(1, 1672531200.0).unwrap();
        ledger.add_transaction("doc1", "pat1", payload_from([("diagnosis", "grippe é")]));
        ledger.seal_pending_block().unwrap();
        ledger.add_transaction("doc2", "pat1", payload_from([("diagnosis", "cold")]));

        let state = ledger.state();
        let json = state.to_canonical_json().unwrap();
        assert!(json.starts_with(r#"{"chain": [{"hash": "#));
        assert_eq!(LedgerState::from_json(&json).unwrap(), state);
    }

    #[test]
    fn test_empty_chain_rejected() {
        let state = LedgerState {
            chain: Vec::new(),
            pending_transactions: Vec::new(),
            difficulty: 2,
        };
        assert!(matches!(state.check_structure(), Err(ChainError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_misplaced_genesis_rejected() {
        let mut state = Ledger::new(2).unwrap().state();
        state.chain[0].index = 5;
        assert!(matches!(state.check_structure(), Err(ChainError::InvalidSnapshot(_))));

        let mut state = Ledger::new(2).unwrap().state();
        state.difficulty = 99;
        assert!(matches!(state.check_structure(), Err(ChainError::InvalidSnapshot(_))));
    }
}

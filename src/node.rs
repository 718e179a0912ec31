//! Shared ledger service.
//!
//! [`LedgerService`] is the handle the rest of an application holds instead
//! of a global ledger. Cloning it is cheap; every clone sees the same chain.
//!
//! Locking discipline:
//! - mutations of the chain and the pending pool happen under the write lock,
//!   and each one is short (queue a transaction, take a candidate, append);
//! - queries take the read lock, so they never see a half-appended chain;
//! - the nonce search runs with no ledger lock held, behind a separate seal
//!   gate so two sealers never interleave;
//! - while a search runs, the candidate's transactions are tracked as in
//!   flight and snapshots list them ahead of the pending pool, so a save made
//!   mid-seal still holds every filed transaction.
//!
//! Lock order is always ledger, then in-flight.

use crate::blockchain::{Block, BlockSummary, ChainIssue, ChainStats, Ledger, LedgerState};
use crate::error::{ChainError, Result};
use crate::miner;
use crate::persistence::Persistence;
use crate::transaction::{HealthRecord, Payload, PatientRecord, Record, Transaction};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct LedgerService {
    ledger: Arc<RwLock<Ledger>>,
    seal_gate: Arc<Mutex<()>>,
    persist_lock: Arc<Mutex<()>>,
    cancel: Arc<AtomicBool>,
    in_flight: Arc<Mutex<Vec<Transaction>>>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl LedgerService {
    /// Wrap a ledger that lives only in memory.
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            seal_gate: Arc::new(Mutex::new(())),
            persist_lock: Arc::new(Mutex::new(())),
            cancel: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(Mutex::new(Vec::new())),
            persistence: None,
        }
    }

    pub fn with_persistence(ledger: Ledger, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            persistence: Some(persistence),
            ..Self::new(ledger)
        }
    }

    /// Restore the ledger saved in `persistence`, or start a new one at
    /// `difficulty` and save its genesis.
    pub fn open(persistence: Arc<dyn Persistence>, difficulty: u32) -> Result<Self> {
        let ledger = match persistence.load_state()? {
            Some(state) => {
                if state.difficulty != difficulty {
                    warn!(
                        saved = state.difficulty,
                        configured = difficulty,
                        "saved ledger difficulty differs from configuration; keeping saved value"
                    );
                }
                Ledger::from_state(state)?
            }
            None => {
                info!(difficulty, "no saved ledger found; starting from genesis");
                Ledger::new(difficulty)?
            }
        };

        let service = Self::with_persistence(ledger, persistence);
        service.persist()?;
        Ok(service)
    }

    pub fn add_transaction(
        &self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: Payload,
    ) {
        self.push_transaction(Transaction::new(sender, recipient, payload));
    }

    pub fn push_transaction(&self, tx: Transaction) {
        self.ledger.write().push_transaction(tx);
        self.persist_best_effort();
    }

    /// Seal the pending pool into a new block.
    ///
    /// The pool is emptied when the candidate is taken, so transactions
    /// added while the search runs wait for the next seal. If the search is
    /// cancelled the candidate's transactions go back to the front of the
    /// pool and `SealCancelled` is returned.
    pub fn seal_pending_block(&self) -> Result<Block> {
        let _gate = self.seal_gate.lock();
        self.cancel.store(false, Ordering::SeqCst);

        let (mut candidate, difficulty) = {
            let mut ledger = self.ledger.write();
            let candidate = ledger.prepare_candidate()?;
            *self.in_flight.lock() = candidate.transactions.clone();
            (candidate, ledger.difficulty())
        };

        let stats = match miner::seal_with_cancel(&mut candidate, difficulty, &self.cancel) {
            Ok(stats) => stats,
            Err(e) => {
                let mut ledger = self.ledger.write();
                ledger.return_pending(candidate.transactions);
                self.in_flight.lock().clear();
                return Err(e);
            }
        };

        let block = {
            let mut ledger = self.ledger.write();
            let appended = ledger.append_sealed(candidate.clone()).cloned();
            self.in_flight.lock().clear();
            match appended {
                Ok(block) => block,
                Err(e) => {
                    ledger.return_pending(candidate.transactions);
                    return Err(e);
                }
            }
        };

        info!(
            index = block.index,
            hash = %block.hash,
            transactions = block.transactions.len(),
            attempts = stats.attempts,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "block sealed"
        );
        self.persist_best_effort();
        Ok(block)
    }

    /// [`seal_pending_block`](Self::seal_pending_block) on the blocking
    /// thread pool, so async callers keep serving while the search runs.
    pub async fn seal_pending_block_async(&self) -> Result<Block> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.seal_pending_block())
            .await
            .map_err(|e| ChainError::TaskError(e.to_string()))?
    }

    /// Ask the seal currently running, if any, to stop. Only that seal is
    /// targeted: the flag is reset whenever a seal starts, so a request made
    /// while another sealer waits behind the gate is dropped once that sealer
    /// begins.
    pub fn cancel_seal(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// File a health record and seal it right away.
    pub fn record_and_seal(
        &self,
        doctor: impl Into<String>,
        patient: impl Into<String>,
        record: HealthRecord,
    ) -> Result<BlockSummary> {
        self.add_transaction(doctor, patient, record.into_payload());
        Ok(self.seal_pending_block()?.summary())
    }

    pub fn records_for(&self, recipient: &str) -> Vec<Record> {
        self.ledger.read().records_for(recipient)
    }

    pub fn patient_records(&self, patient: &str) -> Vec<PatientRecord> {
        self.records_for(patient).iter().map(PatientRecord::from).collect()
    }

    pub fn validate(&self) -> bool {
        self.ledger.read().validate()
    }

    pub fn validation_report(&self) -> Vec<ChainIssue> {
        self.ledger.read().validation_report()
    }

    pub fn stats(&self) -> ChainStats {
        self.ledger.read().stats()
    }

    pub fn latest_block(&self) -> Block {
        self.ledger.read().latest_block().clone()
    }

    pub fn block_summaries(&self) -> Vec<BlockSummary> {
        self.ledger.read().chain().iter().map(Block::summary).collect()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.ledger.read().pending_transactions().to_vec()
    }

    /// The ledger's full state. Transactions of a seal in progress are listed
    /// at the front of `pending_transactions`, where a failed seal puts them.
    pub fn snapshot(&self) -> LedgerState {
        let ledger = self.ledger.read();
        let mut state = ledger.state();
        let in_flight = self.in_flight.lock();
        if !in_flight.is_empty() {
            let mut pending = in_flight.clone();
            pending.append(&mut state.pending_transactions);
            state.pending_transactions = pending;
        }
        state
    }

    /// Run `f` against the ledger under the read lock.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&*self.ledger.read())
    }

    /// Save the current state to the configured backend. No-op without one.
    pub fn persist(&self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        // Snapshots are taken inside the lock so saves land in order.
        let _guard = self.persist_lock.lock();
        let state = self.snapshot();
        persistence.save_state(&state)
    }

    // The in-memory chain is authoritative; a failed save is reported, not fatal.
    fn persist_best_effort(&self) {
        if let Err(e) = self.persist() {
            warn!(error = %e, "failed to persist ledger state");
        }
    }
}

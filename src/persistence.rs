//! Snapshot persistence for the ledger.
//!
//! The ledger itself lives in memory. A backend only has to store and hand
//! back the [`LedgerState`] triple; restoring it does not change any ledger
//! semantics.

use crate::blockchain::{Block, LedgerState, DEFAULT_DIFFICULTY};
use crate::config::{StorageBackend, StorageConfig};
use crate::error::ChainError;
use crate::transaction::{Payload, Transaction};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Abstraction for persistence backends. Implementations must save the
/// whole state atomically: a reader sees the old snapshot or the new one.
pub trait Persistence: Send + Sync {
    fn save_state(&self, state: &LedgerState) -> Result<(), ChainError>;
    /// `None` when nothing has been saved yet.
    fn load_state(&self) -> Result<Option<LedgerState>, ChainError>;
}

/// Open the backend named in the storage configuration.
pub fn open_backend(storage: &StorageConfig) -> Result<Arc<dyn Persistence>, ChainError> {
    let backend: Arc<dyn Persistence> = match storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryPersistence::new()),
        StorageBackend::Json => Arc::new(JsonFileStore::new(&storage.path)),
        StorageBackend::Sqlite => {
            ensure_parent_dir(Path::new(&storage.path))?;
            Arc::new(Database::open(&storage.path)?)
        }
    };
    Ok(backend)
}

fn ensure_parent_dir(path: &Path) -> Result<(), ChainError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                position INTEGER PRIMARY KEY,
                idx INTEGER NOT NULL,
                hash TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                timestamp REAL NOT NULL,
                nonce TEXT NOT NULL,
                transactions TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create blocks table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending_transactions (
                position INTEGER PRIMARY KEY,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                data TEXT NOT NULL,
                timestamp REAL NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create pending_transactions table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create metadata table: {}", e))
        })?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn load_blocks(conn: &Connection) -> Result<Vec<Block>, ChainError> {
        let mut stmt = conn
            .prepare(
                "SELECT idx, hash, previous_hash, timestamp, nonce, transactions
                 FROM blocks ORDER BY position ASC",
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let index: i64 = row.get(0)?;
                let nonce: String = row.get(4)?;
                let transactions_json: String = row.get(5)?;
                Ok((
                    index,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    nonce,
                    transactions_json,
                ))
            })
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for row in rows {
            let (index, hash, previous_hash, timestamp, nonce, transactions_json) =
                row.map_err(|e| ChainError::DatabaseError(format!("Failed to load block: {}", e)))?;
            let transactions: Vec<Transaction> = serde_json::from_str(&transactions_json)
                .map_err(|e| {
                    ChainError::DatabaseError(format!(
                        "Failed to deserialize transactions of block {}: {}",
                        index, e
                    ))
                })?;
            let index = u64::try_from(index).map_err(|_| {
                ChainError::DatabaseError(format!("Stored block index {} is negative", index))
            })?;
            let nonce: u64 = nonce.parse().map_err(|_| {
                ChainError::DatabaseError(format!("Stored nonce '{}' of block {} is not a u64", nonce, index))
            })?;
            blocks.push(Block {
                index,
                transactions,
                timestamp,
                previous_hash,
                nonce,
                hash,
            });
        }
        Ok(blocks)
    }

    fn load_pending(conn: &Connection) -> Result<Vec<Transaction>, ChainError> {
        let mut stmt = conn
            .prepare(
                "SELECT sender, recipient, data, timestamp
                 FROM pending_transactions ORDER BY position ASC",
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(|e| {
                ChainError::DatabaseError(format!("Failed to query pending transactions: {}", e))
            })?;

        let mut pending = Vec::new();
        for row in rows {
            let (sender, recipient, data, timestamp) = row.map_err(|e| {
                ChainError::DatabaseError(format!("Failed to load pending transaction: {}", e))
            })?;
            let payload: Payload = serde_json::from_str(&data).map_err(|e| {
                ChainError::DatabaseError(format!("Failed to deserialize payload: {}", e))
            })?;
            pending.push(Transaction::with_timestamp(sender, recipient, payload, timestamp));
        }
        Ok(pending)
    }
}

impl Persistence for Database {
    fn save_state(&self, state: &LedgerState) -> Result<(), ChainError> {
        let conn_guard = self.conn.lock();
        let tx = conn_guard.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        tx.execute("DELETE FROM blocks", [])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear blocks: {}", e)))?;
        for (position, block) in state.chain.iter().enumerate() {
            let index = i64::try_from(block.index).map_err(|_| {
                ChainError::DatabaseError(format!("Block index {} does not fit in SQLite", block.index))
            })?;
            let transactions_json = serde_json::to_string(&block.transactions).map_err(|e| {
                ChainError::DatabaseError(format!("Failed to serialize transactions: {}", e))
            })?;
            tx.execute(
                "INSERT INTO blocks (position, idx, hash, previous_hash, timestamp, nonce, transactions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    position as i64,
                    index,
                    block.hash,
                    block.previous_hash,
                    block.timestamp,
                    // u64 nonces exceed SQLite's signed INTEGER range.
                    block.nonce.to_string(),
                    transactions_json,
                ],
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to save block: {}", e)))?;
        }

        tx.execute("DELETE FROM pending_transactions", []).map_err(|e| {
            ChainError::DatabaseError(format!("Failed to clear pending transactions: {}", e))
        })?;
        for (position, pending) in state.pending_transactions.iter().enumerate() {
            let data = serde_json::to_string(&pending.payload).map_err(|e| {
                ChainError::DatabaseError(format!("Failed to serialize payload: {}", e))
            })?;
            tx.execute(
                "INSERT INTO pending_transactions (position, sender, recipient, data, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    position as i64,
                    pending.sender,
                    pending.recipient,
                    data,
                    pending.timestamp,
                ],
            )
            .map_err(|e| {
                ChainError::DatabaseError(format!("Failed to save pending transaction: {}", e))
            })?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('difficulty', ?1)",
            params![state.difficulty.to_string()],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save difficulty: {}", e)))?;

        // Commit all changes atomically
        tx.commit().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(blocks = state.chain.len(), "ledger state saved to sqlite");
        Ok(())
    }

    fn load_state(&self) -> Result<Option<LedgerState>, ChainError> {
        let conn_guard = self.conn.lock();
        let chain = Self::load_blocks(&conn_guard)?;
        if chain.is_empty() {
            return Ok(None);
        }
        let pending_transactions = Self::load_pending(&conn_guard)?;

        let stored: Option<String> = conn_guard
            .query_row(
                "SELECT value FROM metadata WHERE key = 'difficulty'",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let difficulty = match stored.as_deref().map(str::parse::<u32>) {
            Some(Ok(difficulty)) => difficulty,
            Some(Err(_)) | None => {
                warn!(
                    "No usable difficulty in metadata; falling back to {}",
                    DEFAULT_DIFFICULTY
                );
                DEFAULT_DIFFICULTY
            }
        };

        Ok(Some(LedgerState {
            chain,
            pending_transactions,
            difficulty,
        }))
    }
}

/// Canonical JSON snapshot in a single file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFileStore {
    fn save_state(&self, state: &LedgerState) -> Result<(), ChainError> {
        ensure_parent_dir(&self.path)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let json = state.to_canonical_json()?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(json.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| ChainError::IoError(e.to_string()))?;

        debug!(path = %self.path.display(), blocks = state.chain.len(), "ledger snapshot written");
        Ok(())
    }

    fn load_state(&self) -> Result<Option<LedgerState>, ChainError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        LedgerState::from_json(&json).map(Some)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    state: Arc<Mutex<Option<LedgerState>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_state(&self, state: &LedgerState) -> Result<(), ChainError> {
        *self.state.lock() = Some(state.clone());
        Ok(())
    }

    fn load_state(&self) -> Result<Option<LedgerState>, ChainError> {
        Ok(self.state.lock().clone())
    }
}

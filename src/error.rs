//! Error types for MedChain

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Hash computation failed: {0}")]
    HashComputation(String),
    #[error("Stale chain tip: expected {expected}, found {found}")]
    StaleChainTip { expected: String, found: String },
    #[error("Sealing of block {index} was cancelled")]
    SealCancelled { index: u64 },
    #[error("Invalid difficulty {0}: a hash has only 64 hex characters")]
    InvalidDifficulty(u32),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Background task failed: {0}")]
    TaskError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

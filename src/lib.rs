//! MedChain - an append-only, hash-chained medical record ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the ledger, snapshots and chain validation
//! - [`transaction`] - Transactions and medical-record payloads
//! - [`hashing`] - Canonical serialization and SHA-256 digests
//!
//! ## Sealing
//! - [`miner`] - Proof-of-work nonce search
//!
//! ## Service & State Management
//! - [`node`] - Shared, lock-disciplined ledger service
//! - [`persistence`] - Snapshot backends (memory, JSON file, SQLite)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cli`] - CLI utilities

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod hashing;
pub mod transaction;

// ============================================================================
// Sealing
// ============================================================================
pub mod miner;

// ============================================================================
// Service & State Management
// ============================================================================
pub mod node;
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;

pub use blockchain::{Block, BlockSummary, Ledger, LedgerState};
pub use error::{ChainError, Result};
pub use node::LedgerService;
pub use transaction::{HealthRecord, Payload, Record, Transaction};

//! Ledger transactions and the medical-record payloads carried in them

pub mod health;
pub mod types;

pub use health::*;
pub use types::*;

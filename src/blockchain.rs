// Thin re-export module: the ledger lives in `blockchain/core.rs`, split into
// the chain itself, its snapshot state and chain validation.

pub mod core;
pub use core::*;

// core.rs splits the ledger into chain management, snapshot state and validation.
pub mod chain;
pub mod state;
pub mod validation;

pub use chain::*;
pub use state::*;
pub use validation::*;

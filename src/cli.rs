//! Helpers shared by the command-line front end.

use crate::config::Config;
use crate::error::ChainError;
use crate::node::LedgerService;
use crate::persistence::open_backend;
use tracing::Level;

/// Install the fmt subscriber. `verbose` forces debug output regardless of
/// the configured level. Safe to call more than once.
pub fn init_tracing(level: &str, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        level.parse().unwrap_or(Level::INFO)
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Open the ledger described by `config`, restoring any saved state.
pub fn open_ledger(config: &Config) -> Result<LedgerService, ChainError> {
    let backend = open_backend(&config.storage)?;
    LedgerService::open(backend, config.ledger.difficulty)
}

/// Shorten a hash for display.
pub fn format_hash(hash: &str) -> String {
    if hash.len() > 20 {
        format!("{}...{}", &hash[..10], &hash[hash.len() - 10..])
    } else {
        hash.to_string()
    }
}

/// Parse a `key=value` command-line pair.
pub fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

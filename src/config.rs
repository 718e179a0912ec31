//! Configuration management for MedChain

use crate::blockchain::DEFAULT_DIFFICULTY;
use crate::error::ChainError;
use crate::hashing::MAX_DIFFICULTY;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DIFFICULTY_ENV: &str = "MEDCHAIN_DIFFICULTY";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_data_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_data_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_data_path() -> String {
    "./data/ledger.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self, ChainError> {
        toml::from_str(source).map_err(|e| ChainError::ConfigError(e.to_string()))
    }

    /// Validate critical values
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.ledger.difficulty > MAX_DIFFICULTY {
            return Err(ChainError::ConfigError(format!(
                "ledger.difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.ledger.difficulty
            )));
        }

        if self.storage.backend != StorageBackend::Memory && self.storage.path.trim().is_empty() {
            return Err(ChainError::ConfigError(
                "storage.path must be set for persistent backends".to_string(),
            ));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ChainError::ConfigError(format!(
                "logging.level '{}' is not one of trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self, difficulty: Option<String>) -> Result<(), ChainError> {
        if let Some(raw) = difficulty {
            self.ledger.difficulty = raw.trim().parse().map_err(|_| {
                ChainError::ConfigError(format!("{} must be an integer, got '{}'", DIFFICULTY_ENV, raw))
            })?;
        }
        Ok(())
    }
}

/// Load configuration from `path`. A missing file yields the defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        Config::from_toml(&config_str)?
    } else {
        Config::default()
    };

    config.apply_env_overrides(std::env::var(DIFFICULTY_ENV).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ledger.difficulty, 2);
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.storage.path, "./data/ledger.json");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [storage]
            backend = "sqlite"
            path = "/tmp/medchain.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.ledger.difficulty, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = Config::from_toml("[ledger]\ndifficulty = 70\n").unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_toml("[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_toml("[storage]\nbackend = \"json\"\npath = \"\"\n").unwrap();
        assert!(config.validate().is_err());

        assert!(Config::from_toml("[storage]\nbackend = \"tape\"\n").is_err());
    }

    #[test]
    fn test_env_override() {
        let mut config = Config::default();
        config.apply_env_overrides(Some("4".to_string())).unwrap();
        assert_eq!(config.ledger.difficulty, 4);
        assert!(config.apply_env_overrides(Some("four".to_string())).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        if std::env::var(DIFFICULTY_ENV).is_ok() {
            return;
        }
        let config = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.ledger.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(config.storage.backend, StorageBackend::Json);
    }
}

//! Configuration module
//!
//! Centralized configuration for the claim engine: database connection,
//! operational mode (in-memory fixtures vs. a live Postgres store), and
//! logging verbosity.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection configuration
    pub database: DatabaseConfig,

    /// Operational mode
    pub mode: OperationalMode,

    /// `tracing_subscriber` env-filter directive, e.g. `"claim_engine=info"`
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            mode: OperationalMode::InMemory,
            log_filter: "claim_engine=info".to_string(),
        }
    }
}

/// Database connection configuration. Host/port/name follow common
/// Postgres conventions; user/password are sourced from `DB_USER`/`DB_PASS`
/// env vars (`original_source/db.py`'s `RUNM_TEST_RESOURCE_DB_USER`/`_PASS`,
/// generalized for this crate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "claim_engine".to_string(),
            user: "claim_engine".to_string(),
            password: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// Builds a `postgres://` connection URL from the configured fields.
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }

    /// Overrides `user`/`password` from the `DB_USER`/`DB_PASS` environment
    /// variables when set, matching the original's environment-driven
    /// credential loading.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(user) = std::env::var("DB_USER") {
            self.user = user;
        }
        if let Ok(password) = std::env::var("DB_PASS") {
            self.password = password;
        }
        self
    }
}

/// Operational mode: which `ClaimStore` adapter the CLI wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationalMode {
    /// In-process store, no external database (default; used by `--reset`
    /// fixture runs and tests).
    InMemory,

    /// Postgres-backed store.
    Postgres,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration with environment-sourced database credentials
    /// applied (spec.md §6 "Environment").
    pub fn from_file_with_env(path: &PathBuf) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.database = config.database.with_env_overrides();
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &PathBuf) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == OperationalMode::Postgres && self.database.name.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database name cannot be empty in postgres mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Create an example configuration file.
    pub fn create_example(path: &PathBuf) -> Result<(), ConfigError> {
        let example = Config {
            database: DatabaseConfig {
                host: "db.internal".to_string(),
                port: 5432,
                name: "claim_engine".to_string(),
                user: "claim_engine".to_string(),
                password: "set-via-DB_PASS".to_string(),
            },
            mode: OperationalMode::Postgres,
            log_filter: "claim_engine=debug".to_string(),
        };
        example.save(path)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialize error: {0}")]
    Serialize(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_in_memory() {
        let config = Config::default();
        assert_eq!(config.mode, OperationalMode::InMemory);
    }

    #[test]
    fn env_overrides_apply_to_database_config() {
        std::env::set_var("DB_USER", "alice");
        std::env::set_var("DB_PASS", "hunter2");
        let db = DatabaseConfig::default().with_env_overrides();
        assert_eq!(db.user, "alice");
        assert_eq!(db.password, "hunter2");
        std::env::remove_var("DB_USER");
        std::env::remove_var("DB_PASS");
    }

    #[test]
    fn postgres_mode_requires_database_name() {
        let mut config = Config::default();
        config.mode = OperationalMode::Postgres;
        config.database.name = String::new();
        assert!(config.validate().is_err());
    }
}

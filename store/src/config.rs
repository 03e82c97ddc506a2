//! Configuration management for the store.

use serde::{Deserialize, Serialize};
use std::env;

/// Environment variable holding the SQLite connection URL.
pub const DATABASE_URL_VAR: &str = "CLINISYNC_DATABASE_URL";
/// Environment variable holding the pool size.
pub const MAX_CONNECTIONS_VAR: &str = "CLINISYNC_MAX_CONNECTIONS";

const IN_MEMORY_URL: &str = "sqlite::memory:";

/// Store configuration, read from environment variables or embedded in an
/// application's own settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// SQLite connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    IN_MEMORY_URL.to_string()
}

fn default_max_connections() -> u32 {
    1
}

impl StoreConfig {
    /// Configuration for the database at `database_url`, one connection.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 1,
        }
    }

    /// A private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_URL)
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Whether the database lives only as long as its connection.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var(DATABASE_URL_VAR).unwrap_or_else(|_| IN_MEMORY_URL.to_string());

        let max_connections = env::var(MAX_CONNECTIONS_VAR)
            .unwrap_or_else(|_| "1".to_string())
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::InvalidMaxConnections)?;

        Ok(Self {
            database_url,
            max_connections,
        })
    }

    /// Load a `.env` file if present, then read the environment.
    pub fn from_dotenv() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CLINISYNC_MAX_CONNECTIONS must be a positive integer")]
    InvalidMaxConnections,
}

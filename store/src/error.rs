//! Error handling for the SQLite store.

use crate::config::ConfigError;

/// Store error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error(transparent)]
    Engine(#[from] clinisync_engine::Error),
}

impl From<StoreError> for clinisync_engine::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Engine(e) => e,
            other => {
                tracing::error!("store error: {:?}", other);
                clinisync_engine::Error::Storage(other.to_string())
            }
        }
    }
}

/// Result type alias for store internals.
pub type Result<T> = std::result::Result<T, StoreError>;

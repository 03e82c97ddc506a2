//! Error types for the sync engine.

use crate::RecordRef;
use thiserror::Error;

/// All possible errors from the sync engine and its store seam.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Remote errors
    #[error("remote error: {diagnostics}")]
    Remote { diagnostics: String },

    #[error("transport error: {0}")]
    Transport(String),

    // Store errors
    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("record already exists: {0}")]
    RecordAlreadyExists(RecordRef),

    #[error("record not found: {0}")]
    RecordNotFound(RecordRef),

    #[error("record {0} has pending edits; delete them or force the purge")]
    PurgeBlocked(RecordRef),

    #[error("storage error: {0}")]
    Storage(String),

    // Payload errors
    #[error("invalid resource: {0}")]
    InvalidResource(String),
}

impl Error {
    /// Create a remote error from server-supplied diagnostics.
    pub fn remote(diagnostics: impl Into<String>) -> Self {
        Self::Remote {
            diagnostics: diagnostics.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

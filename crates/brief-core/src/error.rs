//! Error types for brief-core

use thiserror::Error;

use crate::api::ApiError;
use crate::auth::CredentialError;

/// Result type alias using brief-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in brief-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local storage engine error
    #[error("Storage error: {0}")]
    Storage(String),

    /// `SQLite` error from the key-value store
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Local storage refused a write because it is full
    #[error("Storage quota exceeded writing '{key}' ({needed} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A sync is already running
    #[error("Sync already in progress")]
    Busy,

    /// Credential could not be acquired
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Remote API call failed
    #[error(transparent)]
    Remote(#[from] ApiError),
}

impl Error {
    /// Whether the caller has to sign in again before syncing can resume.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::Credential(error) if error.requires_reauthentication())
    }
}

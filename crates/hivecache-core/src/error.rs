//! Error types for the account cache pipeline.

use thiserror::Error;

/// Errors that can occur while registering or caching accounts.
#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Invalid amount '{raw}': {reason}")]
    InvalidAmount { raw: String, reason: String },

    #[error("Adapter returned unrequested account '{name}'")]
    UnexpectedAccount { name: String },

    #[error("Cache chunk {chunk} failed after {committed} accounts committed: {source}")]
    ChunkFailed {
        chunk: usize,
        committed: usize,
        #[source]
        source: Box<AccountsError>,
    },

    #[error("{0}")]
    Other(String),
}

impl AccountsError {
    /// Number of accounts committed by earlier chunks before this failure.
    ///
    /// Only `ChunkFailed` carries progress; every other error means nothing
    /// was committed by the failing call.
    pub fn committed(&self) -> usize {
        match self {
            Self::ChunkFailed { committed, .. } => *committed,
            _ => 0,
        }
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SluiceError {
    #[error("Log store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Consumer group {group} not found on log {log}")]
    GroupNotFound { log: String, group: String },

    #[error("{kind} {name} already exists")]
    NameConflict { kind: &'static str, name: String },

    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Handler failed for entry {entry_id}: {reason}")]
    HandlerFailure { entry_id: String, reason: String },

    #[error("Transfer from {from} to {to} failed, nothing moved: {reason}")]
    PartialTransfer {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid entry id: {0}")]
    InvalidEntryId(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Stream manager not initialized")]
    NotInitialized,

    #[error("Stream manager has been shut down")]
    Shutdown,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl SluiceError {
    /// True for errors that mean the store could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SluiceError::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, SluiceError>;

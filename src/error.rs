//! Error types.

use thiserror::Error;

/// Failures at the persistence boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Occupancy entry not of the form `room|day|session`
    #[error("Malformed occupancy key '{0}'")]
    MalformedKey(String),

    #[error("Malformed cursor value '{0}'")]
    MalformedCursor(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Errors surfaced to callers of the scheduler.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Subject list is empty")]
    EmptyBatch,

    #[error("Invalid template row '{row_id}': {reason}")]
    InvalidTemplate { row_id: String, reason: String },

    #[error("Invalid room: {0}")]
    InvalidRoom(String),

    /// Cursor outside -1..=11
    #[error("Invalid rotation cursor {0}")]
    InvalidCursor(i32),

    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),
}

impl SchedulerError {
    /// True when the caller sent something structurally invalid.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SchedulerError::Store(_))
    }
}

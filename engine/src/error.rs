//! Error types for the Roost engine.

use thiserror::Error;

/// All possible errors from the Roost engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Event validation errors
    #[error("record has no identifier")]
    MissingRecordId,

    #[error("unknown change action: {0}")]
    UnknownAction(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for CellDB
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using CellDbError
pub type Result<T> = std::result::Result<T, CellDbError>;

/// Unified error type for CellDB operations
#[derive(Debug, Error)]
pub enum CellDbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking I/O task failed: {0}")]
    Task(String),

    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Layout Errors
    // -------------------------------------------------------------------------
    #[error("Page at offset {offset} is cached with {cached} bytes, requested {requested}")]
    PageSize {
        offset: u64,
        cached: usize,
        requested: usize,
    },

    #[error("Record size mismatch: expected {expected} bytes, got {actual}")]
    RecordSize { expected: usize, actual: usize },

    #[error("Corrupt store file: {0}")]
    Corrupt(String),

    // -------------------------------------------------------------------------
    // Async Errors
    // -------------------------------------------------------------------------
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for CellDbError {
    fn from(err: tokio::task::JoinError) -> Self {
        CellDbError::Task(err.to_string())
    }
}

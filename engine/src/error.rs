//! Error types for the contract-sync engine.

use crate::RecordId;
use thiserror::Error;

/// All possible errors from the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Record errors
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("duplicate record id: {0}")]
    DuplicateRecord(RecordId),

    #[error("record is deleted: {0}")]
    RecordDeleted(RecordId),

    // Configuration errors
    #[error("invalid chunk size: {0} (must be at least 1)")]
    InvalidChunkSize(usize),

    // Interchange errors
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("unsupported document format version: {found} (max supported: {supported})")]
    UnsupportedFormatVersion { found: u32, supported: u32 },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

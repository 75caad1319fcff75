//! Error types for HeapDB
//!
//! This module defines all error types used throughout the storage and
//! execution engine.

use thiserror::Error;

use crate::storage::page::{PageId, RecordId};
use crate::transaction::TransactionId;

/// The main error type for HeapDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Lookup Errors ==========
    #[error("No such element: {0}")]
    NoSuchElement(String),

    #[error("No such element: field '{0}' not found")]
    FieldNameNotFound(String),

    #[error("No such element: field {0} is unset")]
    FieldUnset(usize),

    #[error("No such element: table {0} not found")]
    TableNotFound(u32),

    #[error("No such element: table '{0}' not found")]
    TableNameNotFound(String),

    // ========== Argument Errors ==========
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid argument: schema mismatch, expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("Invalid argument: {0} is beyond the end of its table file")]
    PageOutOfRange(PageId),

    #[error("Invalid argument: corrupted page data - {0}")]
    Corrupted(String),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0} is not in the buffer pool")]
    PageNotCached(PageId),

    // ========== Capacity Errors ==========
    #[error("Capacity exceeded: buffer pool of {0} pages cannot make room")]
    BufferPoolFull(usize),

    #[error("Capacity exceeded: {0} has no empty slot")]
    PageFull(PageId),

    // ========== State Errors ==========
    #[error("Illegal state: {0}")]
    IllegalState(String),

    // ========== Storage Errors ==========
    #[error("Storage error: slot {0} is already empty")]
    SlotEmpty(RecordId),

    #[error("Storage error: tuple carries no record id")]
    MissingRecordId,

    // ========== Concurrency Errors ==========
    #[error("Concurrency error: {tid} cannot lock {pid}")]
    LockConflict { tid: TransactionId, pid: PageId },

    // ========== Configuration Errors ==========
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias for HeapDB operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FieldNameNotFound("age".to_string());
        assert_eq!(err.to_string(), "No such element: field 'age' not found");

        let err = Error::PageFull(PageId::new(7, 3));
        assert_eq!(
            err.to_string(),
            "Capacity exceeded: page(7, 3) has no empty slot"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}

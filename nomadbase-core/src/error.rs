// nomadbase-core/src/error.rs
//! Error types for NomadBase
//!
//! One typed failure channel for the whole crate. Engines fail fast on
//! malformed input with no partial evaluation; the master index fails fast
//! on corrupt stored state; storage collaborator failures stay opaque.

use thiserror::Error;

/// NomadBase error taxonomy
///
/// Every variant carries the offending operator name, field path, or
/// collection name in its message so callers can log something actionable.
#[derive(Error, Debug)]
pub enum NomadError {
    /// Malformed query shape, unsupported operator, or malformed logical operand
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Malformed update spec, unsupported operator, or type mismatch
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    /// Document violates the reserved-field contract
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Token mismatch that the active strategy could not resolve.
    /// Never raised under last-write-wins; reserved for future strategies.
    #[error("Conflict on collection '{0}': {1}")]
    Conflict(String, String),

    /// Advisory lock not acquired after bounded retries
    #[error("Lock unavailable for collection '{0}'")]
    LockUnavailable(String),

    /// Stored master index state could not be parsed
    #[error("Master index corrupt: {0}")]
    MasterIndexCorrupt(String),

    /// Collection is not registered in the master index
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Collection already registered
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Opaque failure propagated from a storage collaborator
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the file-backed collaborators
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, NomadError>;

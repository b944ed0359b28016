// nomadbase-core/src/lib.rs
// Pure Rust core - no host bindings, no async runtime

pub mod collection;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod document;
pub mod error;
pub mod logging;
pub mod master_index;
pub mod query;
pub mod storage;
pub mod update;
pub mod value_utils;

// Public exports
pub use collection::Collection;
pub use config::{CoordinationConfig, QueryConfig};
pub use coordinator::{CollectionCoordinator, CoordinationSession};
pub use database::Database;
pub use document::{generate_document_id, validate_document, ID_FIELD};
pub use error::{NomadError, Result};
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use master_index::{
    CollectionMetadata, ConflictStrategy, HistoryOperation, LockStatus, MasterIndex,
    MasterIndexState, ModificationHistoryEntry,
};
pub use query::QueryEngine;
pub use storage::{
    BlobMetadata, BlobStore, DocumentBundle, FileBlobStore, FileKeyValueStore, KeyValueStore,
    MemoryBlobStore, MemoryKeyValueStore,
};
pub use update::{UpdateEngine, UpdateOutcome};

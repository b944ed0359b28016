// nomadbase-core/src/storage/traits.rs
//! Collaborator traits for the two durable external resources
//!
//! Keeping these behind traits buys dependency injection and fast in-memory
//! doubles for tests. Retry/backoff for transient failures belongs to the
//! implementations, never to the callers - by the time an error crosses
//! this boundary it is final.

use super::DocumentBundle;
use crate::error::Result;
use chrono::{DateTime, Utc};

/// Descriptive metadata for a stored blob
#[derive(Debug, Clone, PartialEq)]
pub struct BlobMetadata {
    /// Stable identifier (the locator)
    pub id: String,
    /// Human-facing file name
    pub name: String,
    /// Last modification time
    pub modified_time: DateTime<Utc>,
    /// Serialized size in bytes
    pub size: u64,
}

/// Blob store holding one document bundle per collection.
///
/// Locators are opaque to callers: they come out of `create_file` and go
/// back in unchanged. All operations are synchronous.
pub trait BlobStore: Send + Sync {
    /// Read and deserialize the bundle at `locator`
    fn read_file(&self, locator: &str) -> Result<DocumentBundle>;

    /// Serialize and overwrite the bundle at `locator`
    fn write_file(&self, locator: &str, bundle: &DocumentBundle) -> Result<()>;

    /// Create a new file under `container`, returning its locator
    fn create_file(&self, name: &str, bundle: &DocumentBundle, container: &str) -> Result<String>;

    /// Whether a blob exists at `locator`
    fn file_exists(&self, locator: &str) -> bool;

    /// Descriptive metadata for the blob at `locator`
    fn get_metadata(&self, locator: &str) -> Result<BlobMetadata>;

    /// Remove the blob at `locator`; missing blobs are not an error
    fn delete_file(&self, locator: &str) -> Result<()>;
}

/// Small durable key-value store used purely for cross-run coordination.
///
/// The master index is its only consumer. The store offers no
/// compare-and-swap; serializing access is the advisory lock's job.
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value under `key`, None when absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, overwriting
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; missing keys are not an error
    fn delete(&self, key: &str) -> Result<()>;
}

// nomadbase-core/src/storage/mod.rs
//! Storage collaborators: blob store + durable key-value store
//!
//! The core never talks to the filesystem directly. Collection contents
//! live in a blob store as one bundle per collection; the master index
//! lives in a small key-value store as one serialized value under one key.
//! Both collaborators are synchronous, and their failures reach the core
//! as opaque `NomadError::Storage` values.
//!
//! ```text
//! BlobStore trait                KeyValueStore trait
//!   ├── FileBlobStore              ├── FileKeyValueStore
//!   └── MemoryBlobStore            └── MemoryKeyValueStore
//! ```

pub mod file_storage;
pub mod memory_storage;
pub mod traits;

pub use file_storage::{FileBlobStore, FileKeyValueStore};
pub use memory_storage::{MemoryBlobStore, MemoryKeyValueStore};
pub use traits::{BlobMetadata, BlobStore, KeyValueStore};

use crate::value_utils::wire_instant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The persisted unit for one collection: its documents plus local metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentBundle {
    pub documents: Vec<Value>,
    pub metadata: BundleMetadata,
}

/// Collection-local metadata stored inside the bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleMetadata {
    pub collection: String,
    #[serde(with = "wire_instant")]
    pub created: DateTime<Utc>,
    #[serde(with = "wire_instant")]
    pub last_updated: DateTime<Utc>,
    pub document_count: u64,
}

impl DocumentBundle {
    /// Fresh empty bundle for a newly created collection
    pub fn empty(collection: &str) -> Self {
        let now = Utc::now();
        DocumentBundle {
            documents: Vec::new(),
            metadata: BundleMetadata {
                collection: collection.to_string(),
                created: now,
                last_updated: now,
                document_count: 0,
            },
        }
    }

    /// Refresh the bundle-local bookkeeping after a mutation
    pub fn touch(&mut self) {
        self.metadata.document_count = self.documents.len() as u64;
        self.metadata.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_bundle() {
        let bundle = DocumentBundle::empty("users");
        assert_eq!(bundle.metadata.collection, "users");
        assert_eq!(bundle.metadata.document_count, 0);
        assert!(bundle.documents.is_empty());
    }

    #[test]
    fn test_touch_updates_count() {
        let mut bundle = DocumentBundle::empty("users");
        bundle.documents.push(json!({"_id": "a"}));
        bundle.documents.push(json!({"_id": "b"}));
        bundle.touch();
        assert_eq!(bundle.metadata.document_count, 2);
        assert!(bundle.metadata.last_updated >= bundle.metadata.created);
    }

    #[test]
    fn test_bundle_wire_format_round_trip() {
        let bundle = DocumentBundle::empty("users");
        let wire = serde_json::to_string(&bundle).unwrap();
        // instants serialize in the millisecond ISO-8601 wire grammar
        assert!(wire.contains('Z'));
        let back: DocumentBundle = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.metadata.collection, "users");
        assert_eq!(
            back.metadata.created.timestamp_millis(),
            bundle.metadata.created.timestamp_millis()
        );
    }
}

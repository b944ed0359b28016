// nomadbase-core/src/storage/memory_storage.rs
//! In-memory collaborator doubles for tests
//!
//! Behaviour-compatible with the file-backed implementations, including
//! the create-vs-write distinction and opaque Storage errors. Two database
//! handles sharing one of these (behind an Arc) model two stateless runs
//! hitting the same durable resource.

use super::traits::{BlobMetadata, BlobStore, KeyValueStore};
use super::DocumentBundle;
use crate::error::{NomadError, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory blob store
#[derive(Default)]
pub struct MemoryBlobStore {
    files: RwLock<HashMap<String, DocumentBundle>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read_file(&self, locator: &str) -> Result<DocumentBundle> {
        self.files
            .read()
            .get(locator)
            .cloned()
            .ok_or_else(|| NomadError::Storage(format!("cannot read blob '{}': not found", locator)))
    }

    fn write_file(&self, locator: &str, bundle: &DocumentBundle) -> Result<()> {
        let mut files = self.files.write();
        if !files.contains_key(locator) {
            return Err(NomadError::Storage(format!(
                "cannot write missing blob '{}'",
                locator
            )));
        }
        files.insert(locator.to_string(), bundle.clone());
        Ok(())
    }

    fn create_file(&self, name: &str, bundle: &DocumentBundle, container: &str) -> Result<String> {
        let locator = format!("{}/{}.json", container, name);
        let mut files = self.files.write();
        if files.contains_key(&locator) {
            return Err(NomadError::Storage(format!(
                "blob '{}' already exists",
                locator
            )));
        }
        files.insert(locator.clone(), bundle.clone());
        Ok(locator)
    }

    fn file_exists(&self, locator: &str) -> bool {
        self.files.read().contains_key(locator)
    }

    fn get_metadata(&self, locator: &str) -> Result<BlobMetadata> {
        let files = self.files.read();
        let bundle = files
            .get(locator)
            .ok_or_else(|| NomadError::Storage(format!("cannot stat blob '{}': not found", locator)))?;
        let size = serde_json::to_string(bundle)?.len() as u64;
        let name = locator.rsplit('/').next().unwrap_or(locator).to_string();
        Ok(BlobMetadata {
            id: locator.to_string(),
            name,
            modified_time: Utc::now(),
            size,
        })
    }

    fn delete_file(&self, locator: &str) -> Result<()> {
        self.files.write().remove(locator);
        Ok(())
    }
}

/// In-memory key-value store
#[derive(Default)]
pub struct MemoryKeyValueStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.map.write().remove(key);
        Ok(())
    }
}

// nomadbase-core/src/database.rs
//! Top-level handle wiring the collaborators to the engines
//!
//! A `Database` is cheap, stateless plumbing: it owns the two storage
//! collaborators, the master index view, and one instance of each engine.
//! Collection handles are minted fresh on demand from current master
//! index metadata - nothing is cached between calls, which is exactly
//! what lets independent runs overlap safely.

use crate::collection::Collection;
use crate::config::{CoordinationConfig, QueryConfig};
use crate::coordinator::CollectionCoordinator;
use crate::error::{NomadError, Result};
use crate::log_info;
use crate::master_index::MasterIndex;
use crate::query::QueryEngine;
use crate::storage::{
    BlobStore, DocumentBundle, FileBlobStore, FileKeyValueStore, KeyValueStore,
};
use crate::update::UpdateEngine;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Blob-store container that holds all collection bundles
const COLLECTIONS_CONTAINER: &str = "collections";

/// File name of the key-value store when opening a directory-backed database
const INDEX_FILE_NAME: &str = "master_index.json";

/// Embedded document database over a blob store and a key-value store
pub struct Database {
    blob_store: Arc<dyn BlobStore>,
    master_index: Arc<MasterIndex>,
    coordination_config: CoordinationConfig,
    query_engine: Arc<QueryEngine>,
    update_engine: Arc<UpdateEngine>,
}

impl Database {
    /// Wire a database over explicit collaborators with default tunables
    pub fn new(blob_store: Arc<dyn BlobStore>, kv_store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(
            blob_store,
            kv_store,
            QueryConfig::default(),
            CoordinationConfig::default(),
        )
    }

    /// Wire a database with explicit tunables
    pub fn with_config(
        blob_store: Arc<dyn BlobStore>,
        kv_store: Arc<dyn KeyValueStore>,
        query_config: QueryConfig,
        coordination_config: CoordinationConfig,
    ) -> Self {
        Database {
            blob_store,
            master_index: Arc::new(MasterIndex::new(kv_store, coordination_config)),
            coordination_config,
            query_engine: Arc::new(QueryEngine::new(query_config)),
            update_engine: Arc::new(UpdateEngine::new()),
        }
    }

    /// Open (or create) a file-backed database rooted at a directory
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let blob_store = Arc::new(FileBlobStore::open(root)?);
        let kv_store = Arc::new(FileKeyValueStore::open(root.join(INDEX_FILE_NAME))?);
        Ok(Self::new(blob_store, kv_store))
    }

    // ========== COLLECTION LIFECYCLE ==========

    /// Create and register a collection. Fails if it already exists.
    pub fn create_collection(&self, name: &str) -> Result<Collection> {
        if self.master_index.get_collection(name)?.is_some() {
            return Err(NomadError::CollectionExists(name.to_string()));
        }

        let bundle = DocumentBundle::empty(name);
        let locator = self
            .blob_store
            .create_file(name, &bundle, COLLECTIONS_CONTAINER)?;
        self.master_index.add_collection(
            name,
            &json!({
                "fileLocator": locator,
                "documentCount": 0,
            }),
        )?;
        log_info!("created collection '{}' at '{}'", name, locator);
        self.handle(name.to_string(), locator)
    }

    /// Handle to an existing collection. No implicit creation.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        let metadata = self
            .master_index
            .get_collection(name)?
            .ok_or_else(|| NomadError::CollectionNotFound(name.to_string()))?;
        self.handle(name.to_string(), metadata.file_locator)
    }

    /// Unregister a collection and delete its bundle.
    /// Returns whether the collection existed.
    pub fn drop_collection(&self, name: &str) -> Result<bool> {
        let metadata = match self.master_index.get_collection(name)? {
            Some(metadata) => metadata,
            None => return Ok(false),
        };

        self.master_index.remove_collection(name)?;
        self.blob_store.delete_file(&metadata.file_locator)?;
        log_info!("dropped collection '{}'", name);
        Ok(true)
    }

    /// Names of all registered collections, sorted
    pub fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self
            .master_index
            .get_collections()?
            .into_iter()
            .map(|metadata| metadata.name)
            .collect())
    }

    // ========== MAINTENANCE ==========

    /// Sweep expired advisory locks across all collections
    pub fn cleanup_expired_locks(&self) -> Result<bool> {
        self.master_index.cleanup_expired_collection_locks()
    }

    /// Shared master index view (coordination state, tokens, history)
    pub fn master_index(&self) -> &Arc<MasterIndex> {
        &self.master_index
    }

    fn handle(&self, name: String, locator: String) -> Result<Collection> {
        let coordinator = CollectionCoordinator::new(
            Arc::clone(&self.master_index),
            name.clone(),
            self.coordination_config,
        );
        Ok(Collection::new(
            name,
            locator,
            Arc::clone(&self.blob_store),
            coordinator,
            Arc::clone(&self.query_engine),
            Arc::clone(&self.update_engine),
        ))
    }
}

// nomadbase-core/src/collection.rs
//! Collection façade: thin CRUD surface over the engines
//!
//! A collection handle owns no document state. Reads load the bundle from
//! the blob store and run the query engine over it; mutations do the same
//! inside `coordinate`, so overlapping stateless runs serialize on the
//! advisory lock and persistence is skipped when nothing actually changed.

use crate::coordinator::CollectionCoordinator;
use crate::document::{ensure_document_id, validate_document, ID_FIELD};
use crate::error::{NomadError, Result};
use crate::log_trace;
use crate::query::QueryEngine;
use crate::storage::{BlobStore, DocumentBundle};
use crate::update::UpdateEngine;
use crate::value_utils::values_equal;
use serde_json::Value;
use std::sync::Arc;

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("file_locator", &self.file_locator)
            .finish_non_exhaustive()
    }
}

/// Handle to one registered collection
pub struct Collection {
    name: String,
    file_locator: String,
    blob_store: Arc<dyn BlobStore>,
    coordinator: CollectionCoordinator,
    query_engine: Arc<QueryEngine>,
    update_engine: Arc<UpdateEngine>,
}

impl Collection {
    pub(crate) fn new(
        name: String,
        file_locator: String,
        blob_store: Arc<dyn BlobStore>,
        coordinator: CollectionCoordinator,
        query_engine: Arc<QueryEngine>,
        update_engine: Arc<UpdateEngine>,
    ) -> Self {
        Collection {
            name,
            file_locator,
            blob_store,
            coordinator,
            query_engine,
            update_engine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn load_bundle(&self) -> Result<DocumentBundle> {
        self.blob_store.read_file(&self.file_locator)
    }

    fn store_bundle(&self, bundle: &mut DocumentBundle) -> Result<()> {
        bundle.touch();
        self.blob_store.write_file(&self.file_locator, bundle)
    }

    // ========== READS ==========

    /// All documents matching `query`, in stored order
    pub fn find(&self, query: &Value) -> Result<Vec<Value>> {
        let bundle = self.load_bundle()?;
        self.query_engine.execute(&bundle.documents, query)
    }

    /// First document matching `query`, if any
    pub fn find_one(&self, query: &Value) -> Result<Option<Value>> {
        Ok(self.find(query)?.into_iter().next())
    }

    /// Number of documents matching `query`
    pub fn count_documents(&self, query: &Value) -> Result<u64> {
        Ok(self.find(query)?.len() as u64)
    }

    // ========== MUTATIONS (all run under coordinate) ==========

    /// Insert one document, generating an `_id` when absent.
    /// Returns the document as stored.
    pub fn insert_one(&self, document: Value) -> Result<Value> {
        let (document, id) = ensure_document_id(document)?;
        self.coordinator.coordinate("insertOne", |session| {
            let mut bundle = self.load_bundle()?;
            Self::reject_duplicate_id(&bundle, &document, &id)?;
            bundle.documents.push(document.clone());
            self.store_bundle(&mut bundle)?;
            session.set_document_count(bundle.documents.len() as u64);
            Ok(document.clone())
        })
    }

    /// Insert several documents in one coordinated write.
    /// Validation is all-or-nothing: a bad document fails the batch before
    /// anything is persisted.
    pub fn insert_many(&self, documents: Vec<Value>) -> Result<Vec<Value>> {
        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            prepared.push(ensure_document_id(document)?);
        }

        self.coordinator.coordinate("insertMany", |session| {
            let mut bundle = self.load_bundle()?;
            for (document, id) in &prepared {
                Self::reject_duplicate_id(&bundle, document, id)?;
                bundle.documents.push(document.clone());
            }
            self.store_bundle(&mut bundle)?;
            session.set_document_count(bundle.documents.len() as u64);
            Ok(prepared.iter().map(|(doc, _)| doc.clone()).collect())
        })
    }

    /// Update the first matching document.
    /// Returns (matched_count, modified_count).
    pub fn update_one(&self, query: &Value, update: &Value) -> Result<(u64, u64)> {
        // fail fast on malformed input, before any lock is taken
        self.query_engine.validate(query)?;
        self.update_engine.validate(update)?;
        self.coordinator.coordinate("updateOne", |session| {
            let mut bundle = self.load_bundle()?;
            let mut matched = 0u64;
            let mut modified = 0u64;
            let mut dirty = false;

            for index in 0..bundle.documents.len() {
                if !self.query_engine.matches(&bundle.documents[index], query)? {
                    continue;
                }
                matched = 1;
                let outcome = self.update_engine.apply(&bundle.documents[index], update)?;
                if outcome.modified {
                    modified = 1;
                }
                // skip persistence when the result is structurally unchanged
                if !values_equal(&bundle.documents[index], &outcome.document) {
                    bundle.documents[index] = outcome.document;
                    dirty = true;
                }
                break;
            }

            if dirty {
                self.store_bundle(&mut bundle)?;
            } else {
                log_trace!("updateOne on '{}': nothing to persist", self.name);
            }
            session.set_document_count(bundle.documents.len() as u64);
            Ok((matched, modified))
        })
    }

    /// Update every matching document.
    /// Returns (matched_count, modified_count).
    pub fn update_many(&self, query: &Value, update: &Value) -> Result<(u64, u64)> {
        self.query_engine.validate(query)?;
        self.update_engine.validate(update)?;
        self.coordinator.coordinate("updateMany", |session| {
            let mut bundle = self.load_bundle()?;
            let mut matched = 0u64;
            let mut modified = 0u64;
            let mut dirty = false;

            for index in 0..bundle.documents.len() {
                if !self.query_engine.matches(&bundle.documents[index], query)? {
                    continue;
                }
                matched += 1;
                let outcome = self.update_engine.apply(&bundle.documents[index], update)?;
                if outcome.modified {
                    modified += 1;
                }
                if !values_equal(&bundle.documents[index], &outcome.document) {
                    bundle.documents[index] = outcome.document;
                    dirty = true;
                }
            }

            if dirty {
                self.store_bundle(&mut bundle)?;
            }
            session.set_document_count(bundle.documents.len() as u64);
            Ok((matched, modified))
        })
    }

    /// Delete the first matching document. Returns the deleted count.
    pub fn delete_one(&self, query: &Value) -> Result<u64> {
        self.query_engine.validate(query)?;
        self.coordinator.coordinate("deleteOne", |session| {
            let mut bundle = self.load_bundle()?;
            let mut deleted = 0u64;

            for index in 0..bundle.documents.len() {
                if self.query_engine.matches(&bundle.documents[index], query)? {
                    bundle.documents.remove(index);
                    deleted = 1;
                    break;
                }
            }

            if deleted > 0 {
                self.store_bundle(&mut bundle)?;
            }
            session.set_document_count(bundle.documents.len() as u64);
            Ok(deleted)
        })
    }

    /// Delete every matching document. Returns the deleted count.
    pub fn delete_many(&self, query: &Value) -> Result<u64> {
        self.query_engine.validate(query)?;
        self.coordinator.coordinate("deleteMany", |session| {
            let mut bundle = self.load_bundle()?;
            let before = bundle.documents.len();

            let mut retained = Vec::with_capacity(before);
            for document in bundle.documents.drain(..) {
                if self.query_engine.matches(&document, query)? {
                    continue;
                }
                retained.push(document);
            }
            bundle.documents = retained;

            let deleted = (before - bundle.documents.len()) as u64;
            if deleted > 0 {
                self.store_bundle(&mut bundle)?;
            }
            session.set_document_count(bundle.documents.len() as u64);
            Ok(deleted)
        })
    }

    fn reject_duplicate_id(bundle: &DocumentBundle, document: &Value, id: &str) -> Result<()> {
        let proposed = document
            .get(ID_FIELD)
            .expect("ensure_document_id sets the id");
        let duplicate = bundle
            .documents
            .iter()
            .any(|existing| match existing.get(ID_FIELD) {
                Some(existing_id) => values_equal(existing_id, proposed),
                None => false,
            });
        if duplicate {
            return Err(NomadError::InvalidDocument(format!(
                "duplicate {} '{}' in collection '{}'",
                ID_FIELD, id, bundle.metadata.collection
            )));
        }
        // a structured or reserved-violating document never gets this far
        debug_assert!(validate_document(document).is_ok());
        Ok(())
    }
}

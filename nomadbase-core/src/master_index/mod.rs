// nomadbase-core/src/master_index/mod.rs
//! Master index: the single durable, shared coordination record
//!
//! One serialized value under one key in the key-value collaborator holds
//! per-collection metadata, modification tokens, advisory locks, and a
//! bounded modification history. Because the store has no compare-and-swap,
//! every operation here follows load -> mutate -> persist against the
//! durable value; the lock + token pair built on top is the only defense
//! against two stateless runs overwriting each other from stale reads.

pub mod metadata;

pub use metadata::{
    CollectionMetadata, HistoryOperation, LockStatus, MasterIndexState,
    ModificationHistoryEntry, MASTER_INDEX_VERSION,
};

use crate::config::CoordinationConfig;
use crate::error::{NomadError, Result};
use crate::storage::KeyValueStore;
use crate::{log_debug, log_warn};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// The durable key everything lives under
pub const MASTER_INDEX_KEY: &str = "nomadbase_master_index";

/// Conflict resolution strategies. A closed set: there is no way to ask
/// for an unrecognized strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Merge the caller's changes over stored state and mint a fresh token
    LastWriteWins,
}

/// State machine over [`MasterIndexState`].
///
/// Holds no cached state: each operation re-reads the durable value, so a
/// handle observes every commit made by overlapping runs the moment it
/// looks. The stored value is created lazily on the first load and
/// persisted after every structural change.
pub struct MasterIndex {
    store: Arc<dyn KeyValueStore>,
    config: CoordinationConfig,
}

impl MasterIndex {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CoordinationConfig) -> Self {
        MasterIndex { store, config }
    }

    // ========== STATE LOAD/PERSIST ==========

    /// Load the shared state, creating a fresh one when nothing is stored.
    /// Unparsable stored state is fatal - better to stop than to quietly
    /// rebuild an empty index over live collections.
    fn load(&self) -> Result<MasterIndexState> {
        match self.store.get(MASTER_INDEX_KEY)? {
            None => Ok(MasterIndexState::fresh()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| NomadError::MasterIndexCorrupt(e.to_string())),
        }
    }

    fn persist(&self, state: &mut MasterIndexState) -> Result<()> {
        state.last_updated = Utc::now();
        let serialized = serde_json::to_string(state)?;
        self.store.set(MASTER_INDEX_KEY, &serialized)
    }

    // ========== COLLECTION METADATA ==========

    /// Register (or overwrite) a collection from arbitrary raw metadata.
    ///
    /// The raw value is normalized into canonical form - string/epoch
    /// timestamps become instants, the lock status is defaulted - and
    /// stored under `name`, overriding any name embedded in the raw value.
    pub fn add_collection(&self, name: &str, raw_metadata: &Value) -> Result<CollectionMetadata> {
        let mut state = self.load()?;
        let meta = CollectionMetadata::normalize(
            name,
            raw_metadata,
            self.config.lock_timeout.as_millis() as u64,
        )?;
        state.collections.insert(name.to_string(), meta.clone());
        self.append_history(&mut state, name, HistoryOperation::Add, meta.clone());
        self.persist(&mut state)?;
        log_debug!("registered collection '{}'", name);
        Ok(meta)
    }

    /// Immutably merge changes over a collection's metadata and persist
    pub fn update_collection_metadata(
        &self,
        name: &str,
        changes: &Value,
    ) -> Result<CollectionMetadata> {
        let mut state = self.load()?;
        let current = state
            .collections
            .get(name)
            .ok_or_else(|| NomadError::CollectionNotFound(name.to_string()))?;
        let merged = current.merged_with(changes)?;
        state.collections.insert(name.to_string(), merged.clone());
        self.append_history(&mut state, name, HistoryOperation::UpdateMetadata, merged.clone());
        self.persist(&mut state)?;
        Ok(merged)
    }

    /// Remove a collection and its history. Returns whether it existed.
    pub fn remove_collection(&self, name: &str) -> Result<bool> {
        let mut state = self.load()?;
        let existed = state.collections.remove(name).is_some();
        state.modification_history.remove(name);
        if existed {
            self.persist(&mut state)?;
        }
        Ok(existed)
    }

    /// Fresh copy of one collection's metadata, never a shared handle
    pub fn get_collection(&self, name: &str) -> Result<Option<CollectionMetadata>> {
        Ok(self.load()?.collections.get(name).cloned())
    }

    /// Fresh copies of all registered collections
    pub fn get_collections(&self) -> Result<Vec<CollectionMetadata>> {
        let state = self.load()?;
        let mut collections: Vec<_> = state.collections.values().cloned().collect();
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(collections)
    }

    /// Fresh copy of a collection's modification history, oldest first
    pub fn get_modification_history(&self, name: &str) -> Result<Vec<ModificationHistoryEntry>> {
        let state = self.load()?;
        Ok(state
            .modification_history
            .get(name)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default())
    }

    // ========== MODIFICATION TOKENS ==========

    /// Mint an opaque token. Uniqueness, not meaning.
    pub fn generate_modification_token(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Shape-check a token. Never consults stored state.
    pub fn validate_modification_token(&self, token: &str) -> bool {
        Uuid::parse_str(token).is_ok()
    }

    /// True iff the collection exists and its current token differs from
    /// the caller's. Says only that the caller's view is stale, not what
    /// changed.
    pub fn has_conflict(&self, name: &str, caller_token: &str) -> Result<bool> {
        let state = self.load()?;
        Ok(state
            .collections
            .get(name)
            .map(|meta| meta.modification_token != caller_token)
            .unwrap_or(false))
    }

    /// Reconcile a stale caller view with stored state.
    ///
    /// Last-write-wins merges the caller's changes over stored metadata,
    /// mints a fresh token, persists, and returns the resolved metadata.
    pub fn resolve_conflict(
        &self,
        name: &str,
        changes: &Value,
        strategy: ConflictStrategy,
    ) -> Result<CollectionMetadata> {
        match strategy {
            ConflictStrategy::LastWriteWins => {}
        }

        let mut state = self.load()?;
        let current = state
            .collections
            .get(name)
            .ok_or_else(|| NomadError::CollectionNotFound(name.to_string()))?;
        let mut resolved = current.merged_with(changes)?;
        resolved.modification_token = self.generate_modification_token();
        resolved.last_updated = Utc::now();
        state.collections.insert(name.to_string(), resolved.clone());
        self.append_history(&mut state, name, HistoryOperation::ResolveConflict, resolved.clone());
        self.persist(&mut state)?;
        log_debug!("resolved conflict on '{}' via last-write-wins", name);
        Ok(resolved)
    }

    // ========== ADVISORY LOCKS ==========

    /// Try to take the advisory lock for `op_id`. Non-blocking: succeeds
    /// only when the lock is free or expired, and never waits.
    pub fn acquire_collection_lock(&self, name: &str, op_id: &str) -> Result<bool> {
        let mut state = self.load()?;
        let now = Utc::now();
        let meta = state
            .collections
            .get_mut(name)
            .ok_or_else(|| NomadError::CollectionNotFound(name.to_string()))?;

        if meta.lock_status.expire_if_stale(now) {
            log_warn!("cleared expired lock on '{}' during acquisition", name);
        }

        if meta.lock_status.is_locked {
            log_debug!(
                "lock on '{}' held by {:?}, acquisition by '{}' failed",
                name,
                meta.lock_status.locked_by,
                op_id
            );
            return Ok(false);
        }

        meta.lock_status.acquire(op_id, now);
        self.persist(&mut state)?;
        log_debug!("lock on '{}' acquired by '{}'", name, op_id);
        Ok(true)
    }

    /// Release the lock if `op_id` holds it, or if it already expired.
    /// Returns whether the lock ended up released by this call.
    pub fn release_collection_lock(&self, name: &str, op_id: &str) -> Result<bool> {
        let mut state = self.load()?;
        let now = Utc::now();
        let meta = state
            .collections
            .get_mut(name)
            .ok_or_else(|| NomadError::CollectionNotFound(name.to_string()))?;

        if meta.lock_status.expire_if_stale(now) {
            self.persist(&mut state)?;
            return Ok(true);
        }

        if !meta.lock_status.is_locked {
            return Ok(false);
        }

        if !meta.lock_status.held_by(op_id) {
            log_warn!(
                "refusing to release lock on '{}': held by {:?}, not '{}'",
                name,
                meta.lock_status.locked_by,
                op_id
            );
            return Ok(false);
        }

        meta.lock_status.release();
        self.persist(&mut state)?;
        log_debug!("lock on '{}' released by '{}'", name, op_id);
        Ok(true)
    }

    /// Report the lock state, lazily expiring first
    pub fn is_collection_locked(&self, name: &str) -> Result<bool> {
        let mut state = self.load()?;
        let now = Utc::now();
        let meta = state
            .collections
            .get_mut(name)
            .ok_or_else(|| NomadError::CollectionNotFound(name.to_string()))?;

        if meta.lock_status.expire_if_stale(now) {
            self.persist(&mut state)?;
            return Ok(false);
        }
        Ok(meta.lock_status.is_locked)
    }

    /// Sweep every collection, clearing expired locks.
    /// Returns whether anything changed.
    pub fn cleanup_expired_collection_locks(&self) -> Result<bool> {
        let mut state = self.load()?;
        let now = Utc::now();
        let mut changed = false;
        for meta in state.collections.values_mut() {
            if meta.lock_status.expire_if_stale(now) {
                log_warn!("swept expired lock on '{}'", meta.name);
                changed = true;
            }
        }
        if changed {
            self.persist(&mut state)?;
        }
        Ok(changed)
    }

    // ========== HISTORY ==========

    fn append_history(
        &self,
        state: &mut MasterIndexState,
        name: &str,
        operation: HistoryOperation,
        snapshot: CollectionMetadata,
    ) {
        let entries = state
            .modification_history
            .entry(name.to_string())
            .or_default();
        entries.push_back(ModificationHistoryEntry {
            operation,
            timestamp: Utc::now(),
            snapshot,
        });
        while entries.len() > self.config.history_limit {
            entries.pop_front();
        }
    }
}

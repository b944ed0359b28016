// nomadbase-core/src/coordinator.rs
//! Collection coordinator: lock, reconcile, execute, commit, unlock
//!
//! `coordinate` is the one door every cross-run mutation walks through.
//! It serializes overlapping stateless runs on a collection by combining
//! the advisory lock (mutual exclusion with a timeout backstop) with the
//! modification token (detection of commits the caller has not seen).
//! Neither alone is enough: the key-value store has no compare-and-swap,
//! so bypassing this path reintroduces the lost-update hazard.

use crate::config::CoordinationConfig;
use crate::error::{NomadError, Result};
use crate::master_index::{ConflictStrategy, MasterIndex};
use crate::value_utils::format_instant;
use crate::{log_debug, log_error, log_warn};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Mutable per-call context handed to the callback.
///
/// The callback records what the commit step should persist; the
/// coordinator itself never inspects documents.
pub struct CoordinationSession {
    document_count: Option<u64>,
}

impl CoordinationSession {
    fn new() -> Self {
        CoordinationSession {
            document_count: None,
        }
    }

    /// Record the collection's document count for the metadata commit
    pub fn set_document_count(&mut self, count: u64) {
        self.document_count = Some(count);
    }
}

/// Coordinates logical operations on one collection.
///
/// Owns the caller's last-known modification token; a stale token at the
/// start of a call is reconciled (once, never silently retried beyond
/// that) before the callback observes anything.
pub struct CollectionCoordinator {
    master_index: Arc<MasterIndex>,
    collection: String,
    config: CoordinationConfig,
    last_token: Mutex<Option<String>>,
}

impl CollectionCoordinator {
    pub fn new(
        master_index: Arc<MasterIndex>,
        collection: impl Into<String>,
        config: CoordinationConfig,
    ) -> Self {
        CollectionCoordinator {
            master_index,
            collection: collection.into(),
            config,
            last_token: Mutex::new(None),
        }
    }

    /// The token this coordinator last observed or committed
    pub fn last_known_token(&self) -> Option<String> {
        self.last_token.lock().clone()
    }

    /// Run one logical operation under the collection's advisory lock.
    ///
    /// Protocol: require registration, acquire the lock with bounded
    /// backoff, reconcile a stale token, run the callback exactly once,
    /// commit a fresh token plus metadata on success. The lock is released
    /// on both the success and the failure path; its timeout is the
    /// backstop if this run dies before releasing.
    pub fn coordinate<T, F>(&self, operation_name: &str, callback: F) -> Result<T>
    where
        F: FnOnce(&mut CoordinationSession) -> Result<T>,
    {
        // (1) no implicit creation here - the collection must exist
        let metadata = self
            .master_index
            .get_collection(&self.collection)?
            .ok_or_else(|| NomadError::CollectionNotFound(self.collection.clone()))?;

        // first contact: the metadata we just read is the caller's view
        {
            let mut last = self.last_token.lock();
            if last.is_none() {
                *last = Some(metadata.modification_token.clone());
            }
        }

        // (2) bounded, backed-off acquisition; never an unbounded wait
        let op_id = Uuid::new_v4().to_string();
        self.acquire_with_retries(operation_name, &op_id)?;

        // (3)-(5) under the lock; (6) release on every exit
        let result = self.run_locked(operation_name, callback);
        match self.master_index.release_collection_lock(&self.collection, &op_id) {
            Ok(_) => result,
            Err(release_err) => match result {
                // the operation's own failure is the interesting one
                Err(op_err) => {
                    log_error!(
                        "failed to release lock on '{}' after error: {}",
                        self.collection,
                        release_err
                    );
                    Err(op_err)
                }
                Ok(_) => Err(release_err),
            },
        }
    }

    fn acquire_with_retries(&self, operation_name: &str, op_id: &str) -> Result<()> {
        for attempt in 0..self.config.lock_retry_attempts {
            let backoff = self.config.backoff_for_attempt(attempt);
            if !backoff.is_zero() {
                std::thread::sleep(backoff);
            }
            if self
                .master_index
                .acquire_collection_lock(&self.collection, op_id)?
            {
                return Ok(());
            }
            log_debug!(
                "{} on '{}': lock busy (attempt {}/{})",
                operation_name,
                self.collection,
                attempt + 1,
                self.config.lock_retry_attempts
            );
        }
        log_warn!(
            "{} on '{}': giving up after {} lock attempts",
            operation_name,
            self.collection,
            self.config.lock_retry_attempts
        );
        Err(NomadError::LockUnavailable(self.collection.clone()))
    }

    fn run_locked<T, F>(&self, operation_name: &str, callback: F) -> Result<T>
    where
        F: FnOnce(&mut CoordinationSession) -> Result<T>,
    {
        // (3) the callback must never run against a token known stale
        let caller_token = self.last_known_token();
        if let Some(token) = caller_token.as_deref() {
            if self.master_index.has_conflict(&self.collection, token)? {
                log_warn!(
                    "{} on '{}': stale token, reconciling before callback",
                    operation_name,
                    self.collection
                );
                let resolved = self.master_index.resolve_conflict(
                    &self.collection,
                    &json!({}),
                    ConflictStrategy::LastWriteWins,
                )?;
                *self.last_token.lock() = Some(resolved.modification_token);
            }
        }

        // (4) exactly once, result returned unchanged
        let mut session = CoordinationSession::new();
        let value = callback(&mut session)?;

        // (5) commit: fresh token plus document-count/timestamp metadata
        let new_token = self.master_index.generate_modification_token();
        let mut changes = json!({
            "modificationToken": new_token,
            "lastUpdated": format_instant(Utc::now()),
        });
        if let Some(count) = session.document_count {
            changes["documentCount"] = json!(count);
        }
        self.master_index
            .update_collection_metadata(&self.collection, &changes)?;
        *self.last_token.lock() = Some(new_token);
        log_debug!("{} on '{}': committed", operation_name, self.collection);

        Ok(value)
    }
}

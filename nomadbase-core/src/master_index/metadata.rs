// nomadbase-core/src/master_index/metadata.rs
//! Persisted coordination types: collection metadata, lock status, history
//!
//! Everything in this file ends up inside the single serialized master
//! index value, so the serde attribute surface here IS the wire schema.
//! Field names are camelCase and instants use the millisecond ISO-8601
//! wire grammar; any future reader of the same durable key must
//! deserialize this identically.

use crate::error::{NomadError, Result};
use crate::value_utils::{wire_instant, wire_instant_opt};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Current persisted schema version
pub const MASTER_INDEX_VERSION: u32 = 1;

/// Advisory lock state for one collection.
///
/// The transitions are pure functions over (status, now); expiry is
/// observed by whoever looks next, never pushed by a timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub is_locked: bool,
    pub locked_by: Option<String>,
    #[serde(with = "wire_instant_opt")]
    pub locked_at: Option<DateTime<Utc>>,
    /// Validity window in milliseconds once locked
    pub lock_timeout: u64,
}

impl LockStatus {
    /// Fresh unlocked status with the given timeout window
    pub fn unlocked(lock_timeout_ms: u64) -> Self {
        LockStatus {
            is_locked: false,
            locked_by: None,
            locked_at: None,
            lock_timeout: lock_timeout_ms,
        }
    }

    /// Whether a held lock has outlived its validity window at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_locked {
            return false;
        }
        match self.locked_at {
            Some(locked_at) => {
                now - locked_at >= Duration::milliseconds(self.lock_timeout as i64)
            }
            // a locked status without a timestamp cannot be trusted; expire it
            None => true,
        }
    }

    /// Clear the lock if it has expired. Returns true when state changed.
    pub fn expire_if_stale(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_expired_at(now) {
            self.release();
            true
        } else {
            false
        }
    }

    /// Take the lock for `op_id` at `now`
    pub fn acquire(&mut self, op_id: &str, now: DateTime<Utc>) {
        self.is_locked = true;
        self.locked_by = Some(op_id.to_string());
        self.locked_at = Some(now);
    }

    /// Drop the lock unconditionally
    pub fn release(&mut self) {
        self.is_locked = false;
        self.locked_by = None;
        self.locked_at = None;
    }

    /// Whether `op_id` is the current holder
    pub fn held_by(&self, op_id: &str) -> bool {
        self.is_locked && self.locked_by.as_deref() == Some(op_id)
    }
}

/// Per-collection coordination record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    pub name: String,
    /// Blob-store locator of the collection's document bundle
    pub file_locator: String,
    #[serde(with = "wire_instant")]
    pub created: DateTime<Utc>,
    #[serde(with = "wire_instant")]
    pub last_updated: DateTime<Utc>,
    pub document_count: u64,
    /// Opaque version stamp, regenerated on every committed mutation
    pub modification_token: String,
    pub lock_status: LockStatus,
}

impl CollectionMetadata {
    /// Normalize arbitrary raw metadata into canonical form.
    ///
    /// Timestamps arrive as wire strings or epoch milliseconds and become
    /// instants; a missing token is minted; the lock status is defaulted
    /// to unlocked with the configured timeout. The `name` parameter wins
    /// over any name embedded in the raw value.
    pub fn normalize(name: &str, raw: &Value, lock_timeout_ms: u64) -> Result<Self> {
        let map = raw.as_object().ok_or_else(|| {
            NomadError::MasterIndexCorrupt(format!(
                "metadata for collection '{}' must be an object",
                name
            ))
        })?;

        let now = Utc::now();
        let created = map
            .get("created")
            .and_then(parse_timestamp)
            .unwrap_or(now);
        let last_updated = map
            .get("lastUpdated")
            .and_then(parse_timestamp)
            .unwrap_or(now);
        let file_locator = map
            .get("fileLocator")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let document_count = map
            .get("documentCount")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let modification_token = map
            .get("modificationToken")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(CollectionMetadata {
            name: name.to_string(),
            file_locator,
            created,
            last_updated,
            document_count,
            modification_token,
            lock_status: LockStatus::unlocked(lock_timeout_ms),
        })
    }

    /// Immutably merge a change object over this metadata.
    ///
    /// Changes use the wire field names; the collection name cannot be
    /// changed through a merge. Unknown keys are ignored.
    pub fn merged_with(&self, changes: &Value) -> Result<Self> {
        let changes = changes.as_object().ok_or_else(|| {
            NomadError::MasterIndexCorrupt(format!(
                "metadata changes for collection '{}' must be an object",
                self.name
            ))
        })?;

        let mut merged = self.clone();
        for (key, value) in changes {
            match key.as_str() {
                "fileLocator" => {
                    if let Some(locator) = value.as_str() {
                        merged.file_locator = locator.to_string();
                    }
                }
                "created" => {
                    if let Some(instant) = parse_timestamp(value) {
                        merged.created = instant;
                    }
                }
                "lastUpdated" => {
                    if let Some(instant) = parse_timestamp(value) {
                        merged.last_updated = instant;
                    }
                }
                "documentCount" => {
                    if let Some(count) = value.as_u64() {
                        merged.document_count = count;
                    }
                }
                "modificationToken" => {
                    if let Some(token) = value.as_str() {
                        merged.modification_token = token.to_string();
                    }
                }
                // name changes and unknown keys are dropped on the floor
                _ => {}
            }
        }
        Ok(merged)
    }
}

/// What a history entry records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HistoryOperation {
    #[serde(rename = "ADD")]
    Add,
    #[serde(rename = "UPDATE_METADATA")]
    UpdateMetadata,
    #[serde(rename = "RESOLVE_CONFLICT")]
    ResolveConflict,
}

/// One bounded-history entry: the operation plus a defensive snapshot of
/// the metadata as it stood at that instant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModificationHistoryEntry {
    pub operation: HistoryOperation,
    #[serde(with = "wire_instant")]
    pub timestamp: DateTime<Utc>,
    pub snapshot: CollectionMetadata,
}

/// The whole shared coordination record, persisted as one value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterIndexState {
    pub version: u32,
    #[serde(with = "wire_instant")]
    pub last_updated: DateTime<Utc>,
    pub collections: HashMap<String, CollectionMetadata>,
    pub modification_history: HashMap<String, VecDeque<ModificationHistoryEntry>>,
}

impl MasterIndexState {
    /// Fresh empty state, created lazily on first load
    pub fn fresh() -> Self {
        MasterIndexState {
            version: MASTER_INDEX_VERSION,
            last_updated: Utc::now(),
            collections: HashMap::new(),
            modification_history: HashMap::new(),
        }
    }
}

/// Parse a timestamp that may be a wire instant string or epoch milliseconds
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(s) = value.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    if let Some(ms) = value.as_i64() {
        return DateTime::from_timestamp_millis(ms);
    }
    None
}

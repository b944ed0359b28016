// nomadbase-core/src/document.rs
//! Document contract and field addressing
//!
//! A document is an open, nested, string-keyed JSON object. Exactly one
//! field name is reserved: `_id`, the identity field. No other top-level
//! field may use the underscore prefix - that namespace belongs to the
//! engine.

use crate::error::{NomadError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use uuid::Uuid;

/// The reserved identity field
pub const ID_FIELD: &str = "_id";

/// Prefix reserved for engine-internal fields
pub const RESERVED_PREFIX: char = '_';

/// Capacity of a per-engine dot-path segment cache
const PATH_CACHE_CAPACITY: usize = 256;

/// Generate a fresh document id (UUID v4 string)
pub fn generate_document_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validate a document against the reserved-field contract.
///
/// The document must be a JSON object; `_id`, when present, must be a
/// string or a number; no other top-level key may start with `_`.
pub fn validate_document(doc: &Value) -> Result<()> {
    let map = doc.as_object().ok_or_else(|| {
        NomadError::InvalidDocument("document must be a JSON object".to_string())
    })?;

    for key in map.keys() {
        if key == ID_FIELD {
            continue;
        }
        if key.starts_with(RESERVED_PREFIX) {
            return Err(NomadError::InvalidDocument(format!(
                "field name '{}' uses the reserved '{}' prefix",
                key, RESERVED_PREFIX
            )));
        }
    }

    if let Some(id) = map.get(ID_FIELD) {
        if !(id.is_string() || id.is_number()) {
            return Err(NomadError::InvalidDocument(format!(
                "'{}' must be a string or a number, got {}",
                ID_FIELD, id
            )));
        }
    }

    Ok(())
}

/// Ensure the document carries an id, generating one when absent.
/// Returns the (possibly updated) document and its id rendered as a string.
pub fn ensure_document_id(mut doc: Value) -> Result<(Value, String)> {
    validate_document(&doc)?;
    let map = doc
        .as_object_mut()
        .expect("validate_document guarantees an object");

    let id = match map.get(ID_FIELD) {
        Some(existing) => match existing {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        None => {
            let generated = generate_document_id();
            map.insert(ID_FIELD.to_string(), Value::String(generated.clone()));
            generated
        }
    };

    Ok((doc, id))
}

/// Walk pre-split dot-path segments through nested maps.
///
/// Resolution stops - yielding "absent", never an error - at the first
/// intermediate that is not a map. Array indices are not addressable.
pub fn resolve_segments<'a>(doc: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = doc;
    for segment in segments {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Convenience wrapper: split on '.' and resolve
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    if !path.contains('.') {
        return doc.as_object()?.get(path);
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    resolve_segments(doc, &segments)
}

/// Instance-owned cache of split dot-paths.
///
/// Splitting is cheap but queries tend to hammer the same handful of paths
/// for every document in a collection, so each engine instance keeps a
/// small LRU of path -> segments. Never shared across engines and never
/// process-global.
pub struct PathCache {
    cache: Mutex<LruCache<String, Arc<Vec<String>>>>,
}

impl PathCache {
    pub fn new() -> Self {
        PathCache {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(PATH_CACHE_CAPACITY).unwrap(),
            )),
        }
    }

    /// Split a dot-path into segments, serving repeated paths from the cache
    pub fn segments(&self, path: &str) -> Arc<Vec<String>> {
        let mut cache = self.cache.lock();
        if let Some(segments) = cache.get(path) {
            return Arc::clone(segments);
        }
        let segments: Arc<Vec<String>> =
            Arc::new(path.split('.').map(str::to_string).collect());
        cache.put(path.to_string(), Arc::clone(&segments));
        segments
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_accepts_plain_document() {
        assert!(validate_document(&json!({"name": "Alice", "age": 30})).is_ok());
        assert!(validate_document(&json!({"_id": "abc", "name": "Alice"})).is_ok());
        assert!(validate_document(&json!({"_id": 42})).is_ok());
    }

    #[test]
    fn test_validate_rejects_reserved_prefix() {
        let err = validate_document(&json!({"_version": 1})).unwrap_err();
        assert!(err.to_string().contains("_version"));
    }

    #[test]
    fn test_validate_rejects_non_object() {
        assert!(validate_document(&json!([1, 2, 3])).is_err());
        assert!(validate_document(&json!("doc")).is_err());
    }

    #[test]
    fn test_validate_rejects_structured_id() {
        assert!(validate_document(&json!({"_id": {"nested": true}})).is_err());
        assert!(validate_document(&json!({"_id": null})).is_err());
    }

    #[test]
    fn test_ensure_document_id_generates() {
        let (doc, id) = ensure_document_id(json!({"name": "Bob"})).unwrap();
        assert_eq!(doc[ID_FIELD], json!(id));
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_ensure_document_id_preserves_existing() {
        let (doc, id) = ensure_document_id(json!({"_id": "fixed", "n": 1})).unwrap();
        assert_eq!(id, "fixed");
        assert_eq!(doc[ID_FIELD], json!("fixed"));
    }

    #[test]
    fn test_get_path_nested() {
        let doc = json!({"address": {"city": "Vienna", "geo": {"lat": 48.2}}});
        assert_eq!(get_path(&doc, "address.city"), Some(&json!("Vienna")));
        assert_eq!(get_path(&doc, "address.geo.lat"), Some(&json!(48.2)));
        assert_eq!(get_path(&doc, "address.zip"), None);
    }

    #[test]
    fn test_get_path_stops_at_non_map() {
        let doc = json!({"tags": ["a", "b"], "n": 5});
        // arrays and scalars end resolution quietly
        assert_eq!(get_path(&doc, "tags.0"), None);
        assert_eq!(get_path(&doc, "n.deeper"), None);
    }

    #[test]
    fn test_path_cache_reuses_segments() {
        let cache = PathCache::new();
        let first = cache.segments("a.b.c");
        let second = cache.segments("a.b.c");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.as_ref(), &vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }
}

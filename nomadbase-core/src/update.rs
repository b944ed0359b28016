// nomadbase-core/src/update.rs
//! Update engine: pure application of an update spec to one document
//!
//! `apply` never mutates its input. It clones the document, routes every
//! addressed field through exactly one operator handler, and reports
//! whether anything claimed to modify the result. Persisting (or skipping
//! persistence when the outcome is structurally unchanged) is the caller's
//! job - purity is what makes that check well-defined.

pub mod operators;

use crate::document::{resolve_segments, validate_document, PathCache, ID_FIELD};
use crate::error::{NomadError, Result};
use crate::value_utils::values_equal;
use operators::UpdateOperator;
use serde_json::Value;

/// Result of applying an update spec
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// The new document; the input is untouched
    pub document: Value,
    /// Whether any operator reported a modification
    pub modified: bool,
}

/// Update application engine.
///
/// Owns its dot-path segment cache; construct one per database handle.
pub struct UpdateEngine {
    paths: PathCache,
}

impl UpdateEngine {
    pub fn new() -> Self {
        UpdateEngine {
            paths: PathCache::new(),
        }
    }

    /// Apply an update spec to a document, producing a new document.
    ///
    /// The spec is either a full replacement document (no `$`-prefixed
    /// keys) or an operator document (every top-level key `$`-prefixed).
    /// Mixing the two forms is an InvalidUpdate.
    pub fn apply(&self, document: &Value, spec: &Value) -> Result<UpdateOutcome> {
        let spec_map = spec.as_object().ok_or_else(|| {
            NomadError::InvalidUpdate("update spec must be a JSON object".to_string())
        })?;

        let has_operator_keys = spec_map.keys().any(|k| k.starts_with('$'));
        let has_plain_keys = spec_map.keys().any(|k| !k.starts_with('$'));
        if has_operator_keys && has_plain_keys {
            let offender = spec_map
                .keys()
                .find(|k| !k.starts_with('$'))
                .expect("mixed spec has a plain key");
            return Err(NomadError::InvalidUpdate(format!(
                "cannot mix replacement field '{}' with update operators",
                offender
            )));
        }

        if has_operator_keys {
            self.apply_operator_document(document, spec)
        } else {
            self.apply_replacement(document, spec)
        }
    }

    /// Validate an update spec's shape and operator names without applying
    /// it. A spec that passes here can still fail per-document on type
    /// mismatches ($inc on a string, cross-kind $min), which only exist
    /// once there is a concrete field to look at.
    pub fn validate(&self, spec: &Value) -> Result<()> {
        let spec_map = spec.as_object().ok_or_else(|| {
            NomadError::InvalidUpdate("update spec must be a JSON object".to_string())
        })?;

        let has_operator_keys = spec_map.keys().any(|k| k.starts_with('$'));
        let has_plain_keys = spec_map.keys().any(|k| !k.starts_with('$'));
        if has_operator_keys && has_plain_keys {
            let offender = spec_map
                .keys()
                .find(|k| !k.starts_with('$'))
                .expect("mixed spec has a plain key");
            return Err(NomadError::InvalidUpdate(format!(
                "cannot mix replacement field '{}' with update operators",
                offender
            )));
        }

        if !has_operator_keys {
            return validate_document(spec)
                .map_err(|e| NomadError::InvalidUpdate(e.to_string()));
        }

        for (name, operand) in spec_map {
            let operator = UpdateOperator::parse(name)?;
            if !operand.is_object() {
                return Err(NomadError::InvalidUpdate(format!(
                    "{} operand must be an object of field paths",
                    operator.name()
                )));
            }
        }
        Ok(())
    }

    /// Replacement form: the spec becomes the new document, with the
    /// original identity field carried over. Changing `_id` is rejected.
    fn apply_replacement(&self, document: &Value, replacement: &Value) -> Result<UpdateOutcome> {
        validate_document(replacement)
            .map_err(|e| NomadError::InvalidUpdate(e.to_string()))?;
        let original_id = document.get(ID_FIELD);

        if let (Some(original), Some(proposed)) = (original_id, replacement.get(ID_FIELD)) {
            if !values_equal(original, proposed) {
                return Err(NomadError::InvalidUpdate(format!(
                    "replacement cannot change '{}' from {} to {}",
                    ID_FIELD, original, proposed
                )));
            }
        }

        let mut result = replacement.clone();
        if let (Some(original), Some(map)) = (original_id, result.as_object_mut()) {
            map.entry(ID_FIELD.to_string())
                .or_insert_with(|| original.clone());
        }

        let modified = !values_equal(document, &result);
        Ok(UpdateOutcome {
            document: result,
            modified,
        })
    }

    /// Operator form: every top-level key is a recognized operator whose
    /// operand maps dot-paths to per-field operands.
    fn apply_operator_document(&self, document: &Value, spec: &Value) -> Result<UpdateOutcome> {
        let spec_map = spec.as_object().expect("caller validated the spec shape");
        let mut result = document.clone();
        let mut modified = false;

        for (name, operand) in spec_map {
            let operator = UpdateOperator::parse(name)?;
            let fields = operand.as_object().ok_or_else(|| {
                NomadError::InvalidUpdate(format!(
                    "{} operand must be an object of field paths",
                    operator.name()
                ))
            })?;

            for (path, field_operand) in fields {
                let segments = self.paths.segments(path);
                let current = resolve_segments(&result, &segments);
                let (new_value, field_modified) =
                    operator.apply(path, current, field_operand)?;
                if let Some(new_value) = new_value {
                    set_segments(&mut result, &segments, new_value);
                }
                modified |= field_modified;
            }
        }

        Ok(UpdateOutcome {
            document: result,
            modified,
        })
    }
}

impl Default for UpdateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Store a value at pre-split dot-path segments, creating intermediate
/// maps where the path or an ancestor is absent. A non-map intermediate is
/// replaced by a fresh map, matching the auto-vivification contract.
fn set_segments(doc: &mut Value, segments: &[String], value: Value) {
    if segments.is_empty() {
        return;
    }

    if !doc.is_object() {
        *doc = Value::Object(serde_json::Map::new());
    }
    let map = doc.as_object_mut().expect("just ensured an object");

    if segments.len() == 1 {
        map.insert(segments[0].clone(), value);
        return;
    }

    let child = map
        .entry(segments[0].clone())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    set_segments(child, &segments[1..], value);
}

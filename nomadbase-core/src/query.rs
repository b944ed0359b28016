// nomadbase-core/src/query.rs
//! Query engine: validate a predicate tree once, evaluate it many times
//!
//! A query is a JSON object forming an implicit AND over its keys. A key is
//! either a logical operator (`$and`/`$or` over arrays of sub-queries) or a
//! dot-path field predicate whose value is an operator object or a literal.
//!
//! The engine compiles the raw JSON into an internal predicate tree up
//! front - unknown operators, malformed logical operands, and excessive
//! nesting are rejected before any document is examined - then evaluates
//! the compiled tree per document with no further validation.

pub mod operators;

use crate::config::QueryConfig;
use crate::document::{resolve_segments, PathCache};
use crate::error::{NomadError, Result};
use crate::value_utils::{is_operator_object, values_equal_with_containment};
use operators::{apply_operators, parse_operator_object, ComparisonOperator};
use serde_json::Value;
use std::sync::Arc;

/// One top-level clause of a compiled query
enum Predicate {
    /// `$and`: all sub-queries match; empty operand matches everything
    And(Vec<CompiledQuery>),
    /// `$or`: at least one sub-query matches; empty operand matches nothing
    Or(Vec<CompiledQuery>),
    /// Dot-path field predicate
    Field {
        segments: Arc<Vec<String>>,
        test: FieldTest,
    },
}

/// What a field predicate tests the resolved value against
enum FieldTest {
    /// Literal equality, array-contains-scalar enabled
    Literal(Value),
    /// Validated operator object; all operators AND together
    Operators(Vec<(ComparisonOperator, Value)>),
}

/// A fully validated query, ready for per-document evaluation
struct CompiledQuery {
    clauses: Vec<Predicate>,
}

/// Query evaluation engine.
///
/// Owns its configuration and its dot-path segment cache; construct one per
/// database handle and share it across collections.
pub struct QueryEngine {
    config: QueryConfig,
    paths: PathCache,
}

impl QueryEngine {
    pub fn new(config: QueryConfig) -> Self {
        QueryEngine {
            config,
            paths: PathCache::new(),
        }
    }

    /// Filter `documents` down to those matching `query`.
    ///
    /// Order-preserving; input is never mutated. The empty query matches
    /// every document. Returned documents are fresh clones.
    pub fn execute(&self, documents: &[Value], query: &Value) -> Result<Vec<Value>> {
        let compiled = self.compile(query)?;
        let mut matching = Vec::new();
        for doc in documents {
            if Self::evaluate(doc, &compiled) {
                matching.push(doc.clone());
            }
        }
        Ok(matching)
    }

    /// Check a single document against a query
    pub fn matches(&self, document: &Value, query: &Value) -> Result<bool> {
        let compiled = self.compile(query)?;
        Ok(Self::evaluate(document, &compiled))
    }

    /// Validate a query without evaluating it against anything.
    /// Lets callers fail fast before acquiring locks or loading documents.
    pub fn validate(&self, query: &Value) -> Result<()> {
        self.compile(query).map(|_| ())
    }

    // ========== COMPILATION (all validation happens here) ==========

    fn compile(&self, query: &Value) -> Result<CompiledQuery> {
        self.compile_at_depth(query, 0)
    }

    fn compile_at_depth(&self, query: &Value, depth: usize) -> Result<CompiledQuery> {
        if depth > self.config.max_depth {
            return Err(NomadError::InvalidQuery(format!(
                "query exceeds maximum nesting depth of {}",
                self.config.max_depth
            )));
        }

        let map = query.as_object().ok_or_else(|| {
            NomadError::InvalidQuery("query must be a JSON object".to_string())
        })?;

        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            if key == "$and" || key == "$or" {
                let sub_queries = self.compile_logical_operand(key, value, depth)?;
                if key == "$and" {
                    clauses.push(Predicate::And(sub_queries));
                } else {
                    clauses.push(Predicate::Or(sub_queries));
                }
            } else if key.starts_with('$') {
                return Err(NomadError::InvalidQuery(format!(
                    "unsupported operator: {}",
                    key
                )));
            } else {
                clauses.push(self.compile_field(key, value)?);
            }
        }

        Ok(CompiledQuery { clauses })
    }

    fn compile_logical_operand(
        &self,
        operator: &str,
        operand: &Value,
        depth: usize,
    ) -> Result<Vec<CompiledQuery>> {
        let array = operand.as_array().ok_or_else(|| {
            NomadError::InvalidQuery(format!("{} requires an array of sub-queries", operator))
        })?;

        let mut sub_queries = Vec::with_capacity(array.len());
        for entry in array {
            if !entry.is_object() {
                return Err(NomadError::InvalidQuery(format!(
                    "{} operands must be query objects",
                    operator
                )));
            }
            sub_queries.push(self.compile_at_depth(entry, depth + 1)?);
        }
        Ok(sub_queries)
    }

    fn compile_field(&self, path: &str, value: &Value) -> Result<Predicate> {
        let test = if is_operator_object(value) {
            let object = value.as_object().expect("operator objects are objects");
            FieldTest::Operators(parse_operator_object(object)?)
        } else {
            FieldTest::Literal(value.clone())
        };
        Ok(Predicate::Field {
            segments: self.paths.segments(path),
            test,
        })
    }

    // ========== EVALUATION (no validation, no allocation) ==========

    fn evaluate(document: &Value, query: &CompiledQuery) -> bool {
        query.clauses.iter().all(|clause| match clause {
            Predicate::And(subs) => subs.iter().all(|sub| Self::evaluate(document, sub)),
            Predicate::Or(subs) => subs.iter().any(|sub| Self::evaluate(document, sub)),
            Predicate::Field { segments, test } => {
                let resolved = resolve_segments(document, segments);
                match test {
                    FieldTest::Literal(expected) => values_equal_with_containment(
                        resolved.unwrap_or(&Value::Null),
                        expected,
                    ),
                    FieldTest::Operators(ops) => apply_operators(resolved, ops),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> QueryEngine {
        QueryEngine::new(QueryConfig::default())
    }

    fn people() -> Vec<Value> {
        vec![
            json!({"_id": "a", "name": "Alice", "age": 29, "city": "Vienna", "tags": ["admin", "dev"]}),
            json!({"_id": "b", "name": "Bob", "age": 35, "city": "Graz"}),
            json!({"_id": "c", "name": "Carol", "age": 22, "city": "Vienna", "tags": ["dev"]}),
        ]
    }

    #[test]
    fn test_empty_query_matches_all_in_order() {
        let docs = people();
        let result = engine().execute(&docs, &json!({})).unwrap();
        assert_eq!(result, docs);
    }

    #[test]
    fn test_literal_equality() {
        let docs = people();
        let result = engine().execute(&docs, &json!({"city": "Vienna"})).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0]["name"], "Alice");
        assert_eq!(result[1]["name"], "Carol");
    }

    #[test]
    fn test_gt_boundary() {
        let docs = vec![json!({"age": 29})];
        let eng = engine();
        assert_eq!(eng.execute(&docs, &json!({"age": {"$gt": 25}})).unwrap().len(), 1);
        assert_eq!(eng.execute(&docs, &json!({"age": {"$gt": 29}})).unwrap().len(), 0);
    }

    #[test]
    fn test_implicit_and_over_keys() {
        let docs = people();
        let result = engine()
            .execute(&docs, &json!({"city": "Vienna", "age": {"$lt": 25}}))
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["name"], "Carol");
    }

    #[test]
    fn test_and_or_operators() {
        let docs = people();
        let eng = engine();

        let result = eng
            .execute(
                &docs,
                &json!({"$and": [{"city": "Vienna"}, {"age": {"$gt": 25}}]}),
            )
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["name"], "Alice");

        let result = eng
            .execute(&docs, &json!({"$or": [{"age": {"$lt": 25}}, {"age": {"$gt": 30}}]}))
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_empty_logical_operands() {
        let docs = people();
        let eng = engine();
        // empty $and matches everything, empty $or matches nothing
        assert_eq!(eng.execute(&docs, &json!({"$and": []})).unwrap().len(), 3);
        assert_eq!(eng.execute(&docs, &json!({"$or": []})).unwrap().len(), 0);
    }

    #[test]
    fn test_array_contains_scalar() {
        let docs = people();
        let result = engine().execute(&docs, &json!({"tags": "dev"})).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_dot_path_resolution() {
        let docs = vec![
            json!({"profile": {"contact": {"email": "a@x.org"}}}),
            json!({"profile": "not a map"}),
            json!({}),
        ];
        let result = engine()
            .execute(&docs, &json!({"profile.contact.email": "a@x.org"}))
            .unwrap();
        // the non-map intermediate and the absent field quietly fail to match
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_unknown_top_level_operator_is_named() {
        let err = engine().execute(&people(), &json!({"$nor": []})).unwrap_err();
        assert!(err.to_string().contains("$nor"));
    }

    #[test]
    fn test_unknown_field_operator_is_named() {
        let err = engine()
            .execute(&people(), &json!({"age": {"$gte": 25}}))
            .unwrap_err();
        assert!(err.to_string().contains("$gte"));
    }

    #[test]
    fn test_malformed_logical_operand() {
        let eng = engine();
        assert!(eng.execute(&people(), &json!({"$and": {"city": "Vienna"}})).is_err());
        assert!(eng.execute(&people(), &json!({"$or": [42]})).is_err());
    }

    #[test]
    fn test_non_object_query_rejected() {
        assert!(engine().execute(&people(), &json!("city")).is_err());
        assert!(engine().execute(&people(), &json!([1])).is_err());
    }

    #[test]
    fn test_depth_bound() {
        let eng = QueryEngine::new(QueryConfig { max_depth: 2 });
        let shallow = json!({"$and": [{"$or": [{"a": 1}]}]});
        assert!(eng.execute(&[], &shallow).is_ok());

        let deep = json!({"$and": [{"$or": [{"$and": [{"a": 1}]}]}]});
        let err = eng.execute(&[], &deep).unwrap_err();
        assert!(err.to_string().contains("nesting depth"));
    }

    #[test]
    fn test_execute_never_mutates_input() {
        let docs = people();
        let before = docs.clone();
        let _ = engine().execute(&docs, &json!({"age": {"$gt": 25}})).unwrap();
        assert_eq!(docs, before);
    }

    #[test]
    fn test_null_literal_matches_absent_field() {
        let docs = vec![json!({"a": 1}), json!({"a": 1, "nick": null}), json!({"nick": "x", "a": 1})];
        let result = engine().execute(&docs, &json!({"nick": null})).unwrap();
        assert_eq!(result.len(), 2);
    }
}

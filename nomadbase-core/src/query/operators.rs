// nomadbase-core/src/query/operators.rs
//! Comparison operators for field predicates
//!
//! The operator set is a closed enum. Raw `$name` strings are parsed and
//! validated exactly once, at the query/update document boundary; the
//! evaluator only ever sees already-validated variants.

use crate::error::{NomadError, Result};
use crate::value_utils::{compare_ordering, values_equal};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// The recognized comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    /// `$eq` - strict structural equality (nullish matches only nullish)
    Eq,
    /// `$gt` - strictly greater, same-kind ordering only
    Gt,
    /// `$lt` - strictly less, same-kind ordering only
    Lt,
}

impl ComparisonOperator {
    /// Parse an operator name, rejecting anything outside the closed set
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "$eq" => Ok(ComparisonOperator::Eq),
            "$gt" => Ok(ComparisonOperator::Gt),
            "$lt" => Ok(ComparisonOperator::Lt),
            other => Err(NomadError::InvalidQuery(format!(
                "unsupported operator: {}",
                other
            ))),
        }
    }

    /// The wire name of this operator
    pub fn name(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "$eq",
            ComparisonOperator::Gt => "$gt",
            ComparisonOperator::Lt => "$lt",
        }
    }

    /// Evaluate this operator against a resolved field value.
    ///
    /// An absent field behaves as null: `$eq null` matches it, and any
    /// ordering comparison is "not comparable" and therefore false.
    pub fn matches(&self, doc_value: Option<&Value>, operand: &Value) -> bool {
        let value = doc_value.unwrap_or(&Value::Null);
        match self {
            ComparisonOperator::Eq => values_equal(value, operand),
            ComparisonOperator::Gt => {
                matches!(compare_ordering(value, operand), Some(Ordering::Greater))
            }
            ComparisonOperator::Lt => {
                matches!(compare_ordering(value, operand), Some(Ordering::Less))
            }
        }
    }
}

/// Parse an operator object into validated (operator, operand) pairs.
///
/// Every key must name a recognized comparison operator; the first
/// unrecognized key aborts with InvalidQuery naming it.
pub fn parse_operator_object(object: &Map<String, Value>) -> Result<Vec<(ComparisonOperator, Value)>> {
    let mut operators = Vec::with_capacity(object.len());
    for (name, operand) in object {
        operators.push((ComparisonOperator::parse(name)?, operand.clone()));
    }
    Ok(operators)
}

/// Apply a parsed operator list to one value. All operators AND together.
pub fn apply_operators(doc_value: Option<&Value>, operators: &[(ComparisonOperator, Value)]) -> bool {
    operators.iter().all(|(op, operand)| op.matches(doc_value, operand))
}

/// Validate and apply a raw operator object in one step.
///
/// This is the shared entry point for callers that receive operator
/// objects outside a compiled query - the update engine's `$pull`
/// predicate uses it.
pub fn apply_operator_object(doc_value: Option<&Value>, object: &Map<String, Value>) -> Result<bool> {
    let operators = parse_operator_object(object)?;
    Ok(apply_operators(doc_value, &operators))
}

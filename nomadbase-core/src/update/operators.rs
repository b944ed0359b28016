// nomadbase-core/src/update/operators.rs
//! Update operators and their field-level semantics
//!
//! Same boundary discipline as the query side: `$name` strings become a
//! closed enum during spec validation, and each variant has exactly one
//! handler. A handler receives the current field value (None when absent)
//! and produces the replacement value plus a modified flag; it never sees
//! the surrounding document.

use crate::error::{NomadError, Result};
use crate::query::operators::apply_operator_object;
use crate::value_utils::{compare_ordering, is_operator_object, parse_instant, values_equal};
use serde_json::Value;
use std::cmp::Ordering;

/// The recognized update operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    /// `$set` - unconditional overwrite/create
    Set,
    /// `$inc` - numeric addition, absent field seeds at 0
    Inc,
    /// `$mul` - numeric multiplication, absent field yields 0
    Mul,
    /// `$min` - keep the smaller of field and operand
    Min,
    /// `$max` - keep the larger of field and operand
    Max,
    /// `$pull` - remove matching elements from an array
    Pull,
    /// `$addToSet` - append unless a structurally equal element exists
    AddToSet,
}

impl UpdateOperator {
    /// Parse an operator name, rejecting anything outside the closed set
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "$set" => Ok(UpdateOperator::Set),
            "$inc" => Ok(UpdateOperator::Inc),
            "$mul" => Ok(UpdateOperator::Mul),
            "$min" => Ok(UpdateOperator::Min),
            "$max" => Ok(UpdateOperator::Max),
            "$pull" => Ok(UpdateOperator::Pull),
            "$addToSet" => Ok(UpdateOperator::AddToSet),
            other => Err(NomadError::InvalidUpdate(format!(
                "unsupported operator: {}",
                other
            ))),
        }
    }

    /// The wire name of this operator
    pub fn name(&self) -> &'static str {
        match self {
            UpdateOperator::Set => "$set",
            UpdateOperator::Inc => "$inc",
            UpdateOperator::Mul => "$mul",
            UpdateOperator::Min => "$min",
            UpdateOperator::Max => "$max",
            UpdateOperator::Pull => "$pull",
            UpdateOperator::AddToSet => "$addToSet",
        }
    }

    /// Apply this operator to one addressed field.
    ///
    /// Returns `(Some(new_value), modified)` to store a value at the path,
    /// or `(None, false)` when the field must be left untouched ($pull on
    /// an absent field). `path` is only used in error messages.
    pub fn apply(
        &self,
        path: &str,
        current: Option<&Value>,
        operand: &Value,
    ) -> Result<(Option<Value>, bool)> {
        match self {
            UpdateOperator::Set => Ok((Some(operand.clone()), true)),
            UpdateOperator::Inc => apply_inc(path, current, operand),
            UpdateOperator::Mul => apply_mul(path, current, operand),
            UpdateOperator::Min => apply_min_max(self, path, current, operand),
            UpdateOperator::Max => apply_min_max(self, path, current, operand),
            UpdateOperator::Pull => apply_pull(path, current, operand),
            UpdateOperator::AddToSet => apply_add_to_set(path, current, operand),
        }
    }
}

// ========== NUMERIC OPERATORS ==========

fn require_number<'a>(op: &str, path: &str, role: &str, value: &'a Value) -> Result<&'a Value> {
    if value.is_number() {
        Ok(value)
    } else {
        Err(NomadError::InvalidUpdate(format!(
            "{}: {} for field '{}' must be a number, got {}",
            op, role, path, value
        )))
    }
}

/// Add two JSON numbers, staying integral when both sides are
fn add_numbers(a: &Value, b: &Value) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Value::from(x + y);
    }
    Value::from(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
}

/// Multiply two JSON numbers, staying integral when both sides are
fn mul_numbers(a: &Value, b: &Value) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Value::from(x * y);
    }
    Value::from(a.as_f64().unwrap_or(0.0) * b.as_f64().unwrap_or(0.0))
}

fn apply_inc(path: &str, current: Option<&Value>, operand: &Value) -> Result<(Option<Value>, bool)> {
    // operand must be numeric regardless of field presence
    require_number("$inc", path, "operand", operand)?;
    match current {
        None => Ok((Some(operand.clone()), true)),
        Some(existing) => {
            require_number("$inc", path, "current value", existing)?;
            Ok((Some(add_numbers(existing, operand)), true))
        }
    }
}

fn apply_mul(path: &str, current: Option<&Value>, operand: &Value) -> Result<(Option<Value>, bool)> {
    require_number("$mul", path, "operand", operand)?;
    match current {
        // Absent field multiplies to 0 regardless of operand. Historical
        // MongoDB behaviour, preserved verbatim.
        None => Ok((Some(Value::from(0)), true)),
        Some(existing) => {
            require_number("$mul", path, "current value", existing)?;
            Ok((Some(mul_numbers(existing, operand)), true))
        }
    }
}

// ========== COMPARISON OPERATORS ==========

/// Ordering for $min/$max: same-kind pairs only, with null strictly less
/// than any concrete comparable value. Cross-kind pairs are type errors.
fn min_max_ordering(op: &str, path: &str, a: &Value, b: &Value) -> Result<Ordering> {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ok(Ordering::Equal),
        (true, false) => {
            comparable_kind(op, path, b)?;
            return Ok(Ordering::Less);
        }
        (false, true) => {
            comparable_kind(op, path, a)?;
            return Ok(Ordering::Greater);
        }
        (false, false) => {}
    }
    compare_ordering(a, b).ok_or_else(|| {
        NomadError::InvalidUpdate(format!(
            "{}: cannot compare {} with {} at field '{}'",
            op, a, b, path
        ))
    })
}

fn comparable_kind(op: &str, path: &str, value: &Value) -> Result<()> {
    let comparable = value.is_number() || parse_instant(value).is_some() || value.is_string();
    if comparable {
        Ok(())
    } else {
        Err(NomadError::InvalidUpdate(format!(
            "{}: value {} at field '{}' is not comparable",
            op, value, path
        )))
    }
}

fn apply_min_max(
    op: &UpdateOperator,
    path: &str,
    current: Option<&Value>,
    operand: &Value,
) -> Result<(Option<Value>, bool)> {
    let existing = match current {
        // absent field takes the operand without comparison
        None => return Ok((Some(operand.clone()), true)),
        Some(existing) => existing,
    };

    let ordering = min_max_ordering(op.name(), path, existing, operand)?;
    let keep_existing = match op {
        UpdateOperator::Min => ordering != Ordering::Greater,
        UpdateOperator::Max => ordering != Ordering::Less,
        _ => unreachable!("apply_min_max only handles $min/$max"),
    };

    // A tie keeps the stored value but still reports modified
    let result = if keep_existing {
        existing.clone()
    } else {
        operand.clone()
    };
    Ok((Some(result), true))
}

// ========== ARRAY OPERATORS ==========

/// Does an array element match the $pull operand?
///
/// An operator-object operand acts as a predicate on each element;
/// anything else removes structurally equal elements.
fn pull_matches(element: &Value, operand: &Value) -> Result<bool> {
    if is_operator_object(operand) {
        let object = operand.as_object().expect("operator objects are objects");
        return apply_operator_object(Some(element), object);
    }
    Ok(values_equal(element, operand))
}

fn apply_pull(path: &str, current: Option<&Value>, operand: &Value) -> Result<(Option<Value>, bool)> {
    let array = match current {
        // absent field: no-op, and the field stays absent
        None => return Ok((None, false)),
        Some(Value::Array(array)) => array,
        Some(other) => {
            return Err(NomadError::InvalidUpdate(format!(
                "$pull: field '{}' must be an array, got {}",
                path, other
            )));
        }
    };

    let mut retained = Vec::with_capacity(array.len());
    for element in array {
        if !pull_matches(element, operand)? {
            retained.push(element.clone());
        }
    }

    let modified = retained.len() != array.len();
    Ok((Some(Value::Array(retained)), modified))
}

fn apply_add_to_set(
    path: &str,
    current: Option<&Value>,
    operand: &Value,
) -> Result<(Option<Value>, bool)> {
    let mut array = match current {
        None => Vec::new(),
        Some(Value::Array(array)) => array.clone(),
        Some(other) => {
            return Err(NomadError::InvalidUpdate(format!(
                "$addToSet: field '{}' must be an array, got {}",
                path, other
            )));
        }
    };

    if array.iter().any(|element| values_equal(element, operand)) {
        return Ok((Some(Value::Array(array)), false));
    }
    array.push(operand.clone());
    Ok((Some(Value::Array(array)), true))
}

// nomadbase-core/src/value_utils.rs
//! Strict-type value primitives shared by the query and update engines
//!
//! Everything here is deliberately coercion-free: values of different kinds
//! are never equal and never ordered. The one representational wrinkle is
//! instants, which travel on the wire as millisecond ISO-8601 strings with
//! a trailing UTC marker and are compared by epoch millisecond, not by text.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// Parse a JSON value as an instant.
///
/// Only strings in the wire format qualify: RFC 3339 with an explicit
/// trailing `Z`. Offset forms like `+00:00` are not instants to us - the
/// wire grammar mandates the UTC marker, and being strict here keeps
/// ordinary strings from accidentally comparing chronologically.
pub fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if !s.ends_with('Z') {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format an instant in the wire format (millisecond precision, trailing Z)
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Strict structural equality between two JSON values.
///
/// Rules:
/// - identical values are equal (short-circuit)
/// - either side null: equal only when both are null
/// - two numbers compare numerically (1 and 1.0 are the same number)
/// - two instants compare by epoch millisecond
/// - arrays element-wise, order-sensitive; objects key-wise
/// - no cross-kind coercion of any sort
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    if a.is_null() || b.is_null() {
        return false;
    }
    if let (Value::Number(na), Value::Number(nb)) = (a, b) {
        return match (na.as_f64(), nb.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        };
    }
    if let (Some(ia), Some(ib)) = (parse_instant(a), parse_instant(b)) {
        return ia.timestamp_millis() == ib.timestamp_millis();
    }
    match (a, b) {
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(ma), Value::Object(mb)) => {
            ma.len() == mb.len()
                && ma
                    .iter()
                    .all(|(k, v)| mb.get(k).map_or(false, |w| values_equal(v, w)))
        }
        _ => false,
    }
}

/// Equality with array-contains-scalar enabled: an array additionally
/// equals a non-array scalar when the scalar is a member.
///
/// This is the mode implicit field predicates use, so `{tags: "red"}`
/// matches a document whose `tags` is `["red", "blue"]`. Membership checks
/// themselves are strict.
pub fn values_equal_with_containment(a: &Value, b: &Value) -> bool {
    if values_equal(a, b) {
        return true;
    }
    match (a, b) {
        (Value::Array(arr), scalar) if !scalar.is_array() => {
            arr.iter().any(|elem| values_equal(elem, scalar))
        }
        (scalar, Value::Array(arr)) if !scalar.is_array() => {
            arr.iter().any(|elem| values_equal(elem, scalar))
        }
        _ => false,
    }
}

/// Ordering between two JSON values.
///
/// Defined only for number/number, string/string (code-point order), and
/// instant/instant (chronological). Everything else - including either side
/// null - is "not comparable" and yields None, so both `$gt` and `$lt`
/// evaluate false for such pairs.
pub fn compare_ordering(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(ia), Some(ib)) = (parse_instant(a), parse_instant(b)) {
        return Some(ia.timestamp_millis().cmp(&ib.timestamp_millis()));
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// True iff the value is a non-empty object whose every key is $-prefixed
pub fn is_operator_object(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

/// Serde adapter pinning `DateTime<Utc>` fields to the wire grammar:
/// millisecond ISO-8601 with a trailing `Z`. Reading is lenient about
/// precision, writing always emits milliseconds.
pub mod wire_instant {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_instant(*dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Like [`wire_instant`] but for optional fields (e.g. `locked_at`)
pub mod wire_instant_opt {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => serializer.serialize_some(&format_instant(*dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            None => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_equal_scalars() {
        assert!(values_equal(&json!(5), &json!(5)));
        assert!(values_equal(&json!(5), &json!(5.0)));
        assert!(values_equal(&json!("a"), &json!("a")));
        assert!(!values_equal(&json!(5), &json!("5")));
        assert!(!values_equal(&json!(true), &json!(1)));
    }

    #[test]
    fn test_values_equal_null_rules() {
        assert!(values_equal(&json!(null), &json!(null)));
        assert!(!values_equal(&json!(null), &json!(0)));
        assert!(!values_equal(&json!(""), &json!(null)));
    }

    #[test]
    fn test_values_equal_instants_by_epoch() {
        let a = json!("2024-03-01T10:00:00.000Z");
        let b = json!("2024-03-01T10:00:00Z");
        assert!(values_equal(&a, &b));

        let c = json!("2024-03-01T10:00:00.001Z");
        assert!(!values_equal(&a, &c));
    }

    #[test]
    fn test_values_equal_deep_structures() {
        let a = json!({"x": [1, {"y": "2024-03-01T10:00:00.000Z"}]});
        let b = json!({"x": [1, {"y": "2024-03-01T10:00:00Z"}]});
        assert!(values_equal(&a, &b));

        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_containment_mode() {
        let arr = json!(["red", "blue"]);
        assert!(values_equal_with_containment(&arr, &json!("red")));
        assert!(values_equal_with_containment(&json!("blue"), &arr));
        assert!(!values_equal_with_containment(&arr, &json!("green")));
        // array vs array stays strict structural
        assert!(!values_equal_with_containment(&arr, &json!(["red"])));
        // strict mode never does containment
        assert!(!values_equal(&arr, &json!("red")));
    }

    #[test]
    fn test_compare_ordering_same_kind() {
        assert_eq!(compare_ordering(&json!(10), &json!(5)), Some(Ordering::Greater));
        assert_eq!(compare_ordering(&json!(2.5), &json!(3)), Some(Ordering::Less));
        assert_eq!(compare_ordering(&json!("apple"), &json!("banana")), Some(Ordering::Less));
        assert_eq!(
            compare_ordering(
                &json!("2024-03-01T10:00:00.000Z"),
                &json!("2024-02-01T10:00:00.000Z")
            ),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_compare_ordering_not_comparable() {
        assert_eq!(compare_ordering(&json!("5"), &json!(5)), None);
        assert_eq!(compare_ordering(&json!(null), &json!(5)), None);
        assert_eq!(compare_ordering(&json!(5), &json!(null)), None);
        assert_eq!(compare_ordering(&json!(true), &json!(false)), None);
        assert_eq!(compare_ordering(&json!([1]), &json!([2])), None);
    }

    #[test]
    fn test_parse_instant_strictness() {
        assert!(parse_instant(&json!("2024-03-01T10:00:00.000Z")).is_some());
        assert!(parse_instant(&json!("2024-03-01T10:00:00+00:00")).is_none());
        assert!(parse_instant(&json!("not a date")).is_none());
        assert!(parse_instant(&json!(1700000000000i64)).is_none());
    }

    #[test]
    fn test_format_instant_round_trips() {
        let now = Utc::now();
        let wire = format_instant(now);
        assert!(wire.ends_with('Z'));
        let back = parse_instant(&json!(wire)).unwrap();
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_is_operator_object() {
        assert!(is_operator_object(&json!({"$gt": 5})));
        assert!(is_operator_object(&json!({"$gt": 5, "$lt": 10})));
        assert!(!is_operator_object(&json!({})));
        assert!(!is_operator_object(&json!({"$gt": 5, "plain": 1})));
        assert!(!is_operator_object(&json!("$gt")));
    }
}

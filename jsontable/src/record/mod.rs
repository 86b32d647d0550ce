// Record representation and natural-type value comparison

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// One stored document: field name to JSON value, in file order.
pub type Record = Map<String, Value>;

static NULL: Value = Value::Null;

/// Read a field, treating an absent field as `null`.
pub fn field<'r>(record: &'r Record, column: &str) -> &'r Value {
    record.get(column).unwrap_or(&NULL)
}

/// Whether the field holds something other than `null`.
pub fn has_value(record: &Record, column: &str) -> bool {
    !field(record, column).is_null()
}

/// Equality used by `=`, `whereIn` and de-duplication.
/// Numbers compare by value (`1` equals `1.0`); everything else is strict,
/// so `"1"` never equals `1`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Ordering::Equal,
        _ => a == b,
    }
}

/// Ordering for `<`, `<=`, `>`, `>=`. Only defined when both sides share a
/// natural type (number, string or boolean).
pub fn partial_compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some(compare_numbers(x, y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total ordering used for sorting. Values of different types are ranked
/// null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let Some(ordering) = partial_compare(a, b) {
        return ordering;
    }
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_values(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a.cmp(&b);
    }
    let a = x.as_f64().unwrap_or(f64::NAN);
    let b = y.as_f64().unwrap_or(f64::NAN);
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Render a value as a map key, the way keyed `pluck` needs it.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_field_reads_as_null() {
        let record: Record = serde_json::from_value(json!({ "name": "a" })).unwrap();
        assert!(field(&record, "missing").is_null());
        assert!(!has_value(&record, "missing"));
        assert!(has_value(&record, "name"));
    }

    #[test]
    fn test_numbers_equal_across_representations() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(values_equal(&json!("x"), &json!("x")));
    }

    #[test]
    fn test_partial_compare_refuses_mixed_types() {
        assert_eq!(partial_compare(&json!(2), &json!(10)), Some(Ordering::Less));
        assert_eq!(
            partial_compare(&json!("10"), &json!("2")),
            Some(Ordering::Less)
        );
        assert_eq!(partial_compare(&json!(2), &json!("10")), None);
        assert_eq!(partial_compare(&Value::Null, &json!(1)), None);
    }

    #[test]
    fn test_compare_values_ranks_types() {
        assert_eq!(compare_values(&Value::Null, &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(5), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(-3), &json!(u64::MAX)), Ordering::Less);
        assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
    }

    #[test]
    fn test_key_string() {
        assert_eq!(key_string(&json!("a@b.c")), "a@b.c");
        assert_eq!(key_string(&json!(42)), "42");
        assert_eq!(key_string(&Value::Null), "");
    }
}

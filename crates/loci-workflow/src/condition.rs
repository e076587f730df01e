//! Condition evaluation against item data.
//!
//! Conditions are AND-combined; an empty list always matches. Ordering
//! comparisons are numeric; `contains` is a case-insensitive substring
//! check on strings and membership on arrays.

use loci_core::types::{Condition, ConditionOperator};

/// Evaluate a single condition against the item's data.
///
/// A condition on a field the data does not carry never matches
/// (`not_equals` included: absent is not a value to compare against).
pub fn evaluate_condition(condition: &Condition, data: &serde_json::Value) -> bool {
    let Some(actual) = data.get(&condition.field) else {
        return false;
    };

    match condition.operator {
        ConditionOperator::Equals => json_eq(actual, &condition.value),
        ConditionOperator::NotEquals => !json_eq(actual, &condition.value),
        ConditionOperator::GreaterThan => match (actual.as_f64(), condition.value.as_f64()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        ConditionOperator::LessThan => match (actual.as_f64(), condition.value.as_f64()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        ConditionOperator::Contains => contains(actual, &condition.value),
    }
}

/// AND-combine a workflow's conditions. An empty list always matches.
pub fn conditions_match(conditions: &[Condition], data: &serde_json::Value) -> bool {
    conditions.iter().all(|c| evaluate_condition(c, data))
}

/// Equality with numeric coercion, so `1` matches `1.0`.
fn json_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn contains(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    match actual {
        serde_json::Value::String(haystack) => expected
            .as_str()
            .map(|needle| haystack.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false),
        serde_json::Value::Array(items) => items.iter().any(|item| match (item, expected) {
            (serde_json::Value::String(a), serde_json::Value::String(b)) => {
                a.eq_ignore_ascii_case(b)
            }
            _ => json_eq(item, expected),
        }),
        _ => false,
    }
}

// Workflow Conditions - Evaluates rule conditions against trigger payloads

use crm_automation_shared::{ConditionOperator, WorkflowCondition};
use serde_json::Value;

use super::variables::value_to_string;

/// All conditions must hold. An empty list always matches.
pub fn evaluate_conditions(conditions: &[WorkflowCondition], payload: &Value) -> bool {
    conditions.iter().all(|c| evaluate_condition(c, payload))
}

/// Evaluate a single condition. Never fails: unresolvable fields and unknown
/// operators yield `false` (or the negated operator's natural result).
pub fn evaluate_condition(condition: &WorkflowCondition, payload: &Value) -> bool {
    let field_value = resolve_field(payload, &condition.field);
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => field_value.is_some_and(|v| strict_equals(v, expected)),
        ConditionOperator::NotEquals => !field_value.is_some_and(|v| strict_equals(v, expected)),
        ConditionOperator::Contains => coerce(field_value).contains(&value_to_string(expected)),
        ConditionOperator::NotContains => !coerce(field_value).contains(&value_to_string(expected)),
        ConditionOperator::GreaterThan => compare(field_value, expected, |a, b| a > b),
        ConditionOperator::LessThan => compare(field_value, expected, |a, b| a < b),
        ConditionOperator::GreaterThanOrEqual => compare(field_value, expected, |a, b| a >= b),
        ConditionOperator::LessThanOrEqual => compare(field_value, expected, |a, b| a <= b),
        ConditionOperator::IsEmpty => is_empty(field_value),
        ConditionOperator::IsNotEmpty => !is_empty(field_value),
        ConditionOperator::In => match expected.as_array() {
            Some(list) => field_value.is_some_and(|v| list.iter().any(|item| strict_equals(v, item))),
            None => false,
        },
        ConditionOperator::NotIn => match expected.as_array() {
            Some(list) => !field_value.is_some_and(|v| list.iter().any(|item| strict_equals(v, item))),
            None => false,
        },
        ConditionOperator::Unknown => false,
    }
}

/// Walk a dot-separated path through nested objects.
pub fn resolve_field<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(payload, |current, segment| current.as_object()?.get(segment))
}

/// Parse the leading numeric portion of a value, the way a lenient float
/// parser does: `"12px"` is 12, `"abc"` is not a number.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number_prefix(s),
        _ => None,
    }
}

fn parse_number_prefix(input: &str) -> Option<f64> {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        return s[..end + "Infinity".len()].replace("Infinity", "inf").parse().ok();
    }

    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }

    if mantissa_digits == 0 {
        return None;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().ok()
}

fn strict_equals(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}

fn coerce(value: Option<&Value>) -> String {
    value.map(value_to_string).unwrap_or_default()
}

fn compare(actual: Option<&Value>, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(parse_number), parse_number(expected)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(v) => value_to_string(v).trim().is_empty(),
    }
}

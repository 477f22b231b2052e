/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! The assertion operator table.
//!
//! Operators are addressed by their stored names — the original operator
//! labels plus ASCII aliases — and compare dynamically-typed values with
//! explicit normalization: digit strings become integers, `x.y` strings
//! become floats, `"true"`/`"false"` become booleans. Ordering operators
//! compare numerically when both sides normalize to numbers and fall back
//! to string order otherwise.

use serde_json::Value;

use crate::error::StepError;
use crate::models::variable::value_as_string;

/// Normalizes a value for comparison.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            let is_signed_digits = {
                let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
            };
            if is_signed_digits {
                if let Ok(n) = trimmed.parse::<i64>() {
                    return Value::from(n);
                }
            }
            if trimmed.contains('.') {
                if let Ok(f) = trimmed.parse::<f64>() {
                    if let Some(number) = serde_json::Number::from_f64(f) {
                        return Value::Number(number);
                    }
                }
            }
            match trimmed.to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => value.clone(),
            }
        }
        other => other.clone(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Type-aware equality: raw equality first, then equality of the
/// normalized forms (numeric forms compare by value, so `1 == 1.0` and
/// `"1" == 1` both hold).
fn type_aware_equals(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    let norm_actual = normalize(actual);
    let norm_expected = normalize(expected);
    if let (Some(a), Some(b)) = (as_f64(&norm_actual), as_f64(&norm_expected)) {
        return a == b;
    }
    norm_actual == norm_expected
}

fn type_aware_order(actual: &Value, expected: &Value, op: fn(f64, f64) -> bool, str_op: fn(&str, &str) -> bool) -> bool {
    let norm_actual = normalize(actual);
    let norm_expected = normalize(expected);
    if let (Some(a), Some(b)) = (as_f64(&norm_actual), as_f64(&norm_expected)) {
        return op(a, b);
    }
    str_op(&value_as_string(actual), &value_as_string(expected))
}

fn is_empty(actual: &Value) -> bool {
    matches!(actual, Value::Null) || matches!(actual, Value::String(s) if s.is_empty())
}

/// Compares `actual` against `expected` under the named operator.
pub fn compare(actual: &Value, operation: &str, expected: &Value) -> Result<bool, StepError> {
    let outcome = match operation {
        "等于" | "equals" => type_aware_equals(actual, expected),
        "不等于" | "not-equals" => !type_aware_equals(actual, expected),
        "大于" | "greater-than" => type_aware_order(actual, expected, |a, b| a > b, |a, b| a > b),
        "大于等于" | "greater-or-equal" => {
            type_aware_order(actual, expected, |a, b| a >= b, |a, b| a >= b)
        }
        "小于" | "less-than" => type_aware_order(actual, expected, |a, b| a < b, |a, b| a < b),
        "小于等于" | "less-or-equal" => {
            type_aware_order(actual, expected, |a, b| a <= b, |a, b| a <= b)
        }
        "长度等于" | "length-equals" => {
            let expected_len = as_f64(&normalize(expected)).ok_or_else(|| {
                StepError::parameter(format!(
                    "length-equals needs a numeric expected value, got: {expected}"
                ))
            })?;
            value_as_string(actual).chars().count() as f64 == expected_len
        }
        "包含" | "contains" => value_as_string(actual).contains(&value_as_string(expected)),
        "不包含" | "not-contains" => !value_as_string(actual).contains(&value_as_string(expected)),
        "以...开始" | "starts-with" => {
            value_as_string(actual).starts_with(&value_as_string(expected))
        }
        "以...结束" | "ends-with" => value_as_string(actual).ends_with(&value_as_string(expected)),
        "非空" | "not-empty" => !is_empty(actual),
        "为空" | "is-empty" => is_empty(actual),
        other => {
            return Err(StepError::parameter(format!(
                "unsupported comparison operator: {other}"
            )))
        }
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equals_is_type_aware() {
        assert!(compare(&json!(1), "等于", &json!(1)).unwrap());
        assert!(compare(&json!("1"), "等于", &json!(1)).unwrap());
        assert!(compare(&json!(1.0), "equals", &json!(1)).unwrap());
        assert!(compare(&json!("true"), "equals", &json!(true)).unwrap());
        assert!(!compare(&json!("x"), "等于", &json!("y")).unwrap());
    }

    #[test]
    fn test_not_equals() {
        assert!(compare(&json!(2), "不等于", &json!(1)).unwrap());
        assert!(!compare(&json!("7"), "not-equals", &json!(7)).unwrap());
    }

    #[test]
    fn test_ordering_normalizes_numeric_strings() {
        assert!(compare(&json!("10"), "大于", &json!(9)).unwrap());
        assert!(compare(&json!("2.5"), "小于等于", &json!("2.50")).unwrap());
        assert!(compare(&json!(3), "greater-or-equal", &json!(3)).unwrap());
    }

    #[test]
    fn test_ordering_falls_back_to_string_order() {
        assert!(compare(&json!("b"), "大于", &json!("a")).unwrap());
        assert!(compare(&json!("apple"), "less-than", &json!("banana")).unwrap());
    }

    #[test]
    fn test_length_equals() {
        assert!(compare(&json!("abcde"), "长度等于", &json!(5)).unwrap());
        assert!(compare(&json!(12345), "length-equals", &json!("5")).unwrap());
        assert!(compare(&json!("ab"), "长度等于", &json!("x")).is_err());
    }

    #[test]
    fn test_contains_and_affixes() {
        assert!(compare(&json!("hello world"), "包含", &json!("world")).unwrap());
        assert!(compare(&json!("hello"), "不包含", &json!("x")).unwrap());
        assert!(compare(&json!("hello"), "以...开始", &json!("he")).unwrap());
        assert!(compare(&json!("hello"), "ends-with", &json!("lo")).unwrap());
        // Numbers compare through their string form.
        assert!(compare(&json!(12345), "contains", &json!(234)).unwrap());
    }

    #[test]
    fn test_empty_checks() {
        assert!(compare(&Value::Null, "为空", &Value::Null).unwrap());
        assert!(compare(&json!(""), "is-empty", &Value::Null).unwrap());
        assert!(compare(&json!("x"), "非空", &Value::Null).unwrap());
        assert!(compare(&json!(0), "not-empty", &Value::Null).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        assert!(compare(&json!(1), "resembles", &json!(1)).is_err());
    }
}

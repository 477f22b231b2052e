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

//! Condition branch (IF) step, plus the condition machinery shared with
//! CONDITION loops.
//!
//! A condition is a JSON object `{value, operation, except_value, desc}`.
//! Stored conditions may carry the source platform's `None`/`True`/`False`
//! tokens, which are rewritten to JSON before parsing. The `value` side
//! may be a literal, a `${name}` reference, or a `${func(...)}` call.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::execute_children;
use crate::engine::compare;
use crate::engine::context::ExecutionContext;
use crate::error::StepError;
use crate::models::Step;

static RE_NONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bNone\b").expect("token regex"));
static RE_TRUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bTrue\b").expect("token regex"));
static RE_FALSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bFalse\b").expect("token regex"));

/// One parsed condition object.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Condition {
    pub value: Value,
    pub operation: String,
    #[serde(default)]
    pub except_value: Value,
    #[serde(default)]
    pub desc: Option<String>,
}

/// Parses a condition JSON string, tolerating Python-style tokens.
pub(crate) fn parse_condition(raw: &str) -> Result<Condition, StepError> {
    let normalized = RE_NONE.replace_all(raw, "null");
    let normalized = RE_TRUE.replace_all(&normalized, "true");
    let normalized = RE_FALSE.replace_all(&normalized, "false");
    let condition: Condition = serde_json::from_str(&normalized).map_err(|e| {
        StepError::parameter(format!(
            "condition expression is not valid JSON (line {}, column {}): {e}",
            e.line(),
            e.column()
        ))
    })?;
    if condition.operation.trim().is_empty() {
        return Err(StepError::parameter(
            "condition expression is missing its [operation] field",
        ));
    }
    if condition.value.is_null() {
        return Err(StepError::parameter(
            "condition expression is missing its [value] field",
        ));
    }
    Ok(condition)
}

/// Resolves the condition's `value` side and compares it against the
/// expected value. An unresolved `${name}` left over after resolution is
/// reported as an undefined variable rather than compared literally.
pub(crate) fn evaluate_condition(
    condition: &Condition,
    ctx: &mut ExecutionContext,
) -> Result<bool, StepError> {
    let resolved = ctx.resolve_placeholders(&condition.value);
    let actual = match &resolved {
        Value::String(s) if s.starts_with("${") && s.ends_with('}') => {
            let name = &s[2..s.len() - 1];
            ctx.get_variable(name).map_err(|_| {
                StepError::parameter(format!(
                    "condition references an undefined variable: {name}"
                ))
            })?
        }
        other => other.clone(),
    };
    compare::compare(&actual, &condition.operation, &condition.except_value)
}

pub(super) async fn execute(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut super::StepOutcome,
) -> Result<(), StepError> {
    let raw = step
        .conditions
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| StepError::parameter("branch step is missing its required [conditions]"))?;
    let condition = parse_condition(raw)?;
    let desc = condition.desc.clone().unwrap_or_default();

    if !evaluate_condition(&condition, ctx)? {
        outcome.success = true;
        outcome.message = format!("condition not met: {desc}");
        let message = outcome.message.clone();
        ctx.log(message);
        return Ok(());
    }

    outcome.message = format!("condition met: {desc}");
    let message = outcome.message.clone();
    ctx.log(message);
    for child in execute_children(step, ctx).await {
        if !child.success {
            outcome.success = false;
        }
        outcome.children.push(child);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_condition_rewrites_python_tokens() {
        let condition =
            parse_condition(r#"{"value": True, "operation": "等于", "except_value": None}"#)
                .unwrap();
        assert_eq!(condition.value, json!(true));
        assert_eq!(condition.except_value, Value::Null);
    }

    #[test]
    fn test_parse_condition_rejects_bad_json() {
        assert!(parse_condition("{value: broken").is_err());
        assert!(parse_condition(r#"{"value": 1}"#).is_err());
    }
}

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

//! Placeholder resolution.
//!
//! `${name}` tokens are replaced from the variable pool and
//! `${func(args)}` tokens from the generator catalog. Plain values get a
//! single bare pass ([`resolve_string`], recursively [`resolve_value`]);
//! scripted code gets three ordered passes ([`resolve_code`]):
//!
//! 1. quoted literal `"${name}"` → a code literal of the value (strings
//!    stay quoted, numbers/bools/null go bare), so `d["k"] = "${name}"`
//!    does not turn into a free identifier;
//! 2. quoted concatenation `"pre_${name}_post"` → the value spliced into
//!    the surrounding string, re-run to a fixed point so later
//!    placeholders in the same literal are not mistaken for code;
//! 3. bare `${name}` in code position → a code literal of the value.
//!
//! A placeholder that cannot be resolved keeps its literal text and adds a
//! note to the transcript; resolution never fails a step by itself.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::engine::generators;
use crate::models::variable::value_as_string;

/// Bare `${content}` token.
pub(crate) static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder regex"));

// Quote-aware passes need one pattern per quote character: the upstream
// single-pattern form relies on backreferences, which this regex engine
// deliberately omits.
static RE_QUOTED_DOUBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""\$\{([^}]+)\}""#).expect("quoted regex"));
static RE_QUOTED_SINGLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'\$\{([^}]+)\}'").expect("quoted regex"));
static RE_CONCAT_DOUBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*?)\$\{([^}]+)\}([^"]*?)""#).expect("concat regex"));
static RE_CONCAT_SINGLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([^']*?)\$\{([^}]+)\}([^']*?)'").expect("concat regex"));

/// Variable pool lookup: `Some(value)` on hit, `None` on miss.
pub type Lookup<'a> = dyn Fn(&str) -> Option<Value> + 'a;

/// Resolves every `${...}` in `input` with string substitution: function
/// calls through the generator catalog, names through the pool, both in
/// the same sweep. Unresolved tokens stay literal.
pub fn resolve_string(input: &str, lookup: &Lookup<'_>, notes: &mut Vec<String>) -> String {
    RE_PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| {
            let content = caps[1].trim();
            if content.is_empty() {
                notes.push("placeholder resolution failed: empty reference kept as-is".into());
                return caps[0].to_string();
            }
            if content.contains('(') && content.contains(')') {
                return match resolve_function(content) {
                    Ok(resolved) => {
                        notes.push(format!(
                            "placeholder (function) resolved: ${{{content}}} => {resolved}"
                        ));
                        resolved
                    }
                    Err(reason) => {
                        notes.push(format!(
                            "placeholder (function) resolution failed, kept as-is: {reason}"
                        ));
                        caps[0].to_string()
                    }
                };
            }
            match lookup(content) {
                Some(value) => {
                    let rendered = value_as_string(&value);
                    notes.push(format!("placeholder resolved: ${{{content}}} => {rendered}"));
                    rendered
                }
                None => {
                    notes.push(format!(
                        "placeholder resolution failed: variable ({content}) is not defined, kept as-is"
                    ));
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

fn resolve_function(content: &str) -> Result<String, String> {
    let (name, kwargs) = generators::parse_call(content)
        .ok_or_else(|| format!("not a valid function call: {content}"))?;
    match generators::call_generator(&name, &kwargs) {
        Ok(value) => Ok(value_as_string(&value)),
        Err(err) => Err(err.to_string()),
    }
}

/// Recursive resolution over a JSON value.
///
/// Strings get [`resolve_string`]; objects recurse per entry; list items
/// shaped like `{key, value, desc}` resolve only their `value`, other
/// items recurse whole. Scalars pass through untouched.
pub fn resolve_value(value: &Value, lookup: &Lookup<'_>, notes: &mut Vec<String>) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_string(s, lookup, notes)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, lookup, notes)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) if map.contains_key("key") && map.contains_key("value") => {
                        let mut resolved = map.clone();
                        if let Some(v) = map.get("value") {
                            resolved.insert("value".into(), resolve_value(v, lookup, notes));
                        }
                        Value::Object(resolved)
                    }
                    other => resolve_value(other, lookup, notes),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Renders a value as a code literal for substitution into script text:
/// strings quoted with escapes preserved, numbers and booleans bare,
/// null as `null`, structures as JSON.
fn value_as_code_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// The three code-aware passes, in order. See the module docs.
pub fn resolve_code(code: &str, lookup: &Lookup<'_>, notes: &mut Vec<String>) -> String {
    let mut code = code.to_string();

    // Pass 1: "${name}" / '${name}' becomes a literal of the value.
    for re in [&*RE_QUOTED_DOUBLE, &*RE_QUOTED_SINGLE] {
        code = re
            .replace_all(&code, |caps: &Captures<'_>| {
                let name = caps[1].trim();
                match lookup(name) {
                    Some(value) => value_as_code_literal(&value),
                    None => {
                        notes.push(format!(
                            "code placeholder resolution failed: variable ({name}) is not defined, kept as-is"
                        ));
                        caps[0].to_string()
                    }
                }
            })
            .into_owned();
    }

    // Pass 2: splice into quoted concatenations, re-running until no
    // occurrence is left so "a_${x}_${y}" resolves completely instead of
    // the second token falling through to the bare pass.
    loop {
        let mut changed = false;
        for (re, quote) in [(&*RE_CONCAT_DOUBLE, '"'), (&*RE_CONCAT_SINGLE, '\'')] {
            let next = re
                .replace_all(&code, |caps: &Captures<'_>| {
                    let name = caps[2].trim();
                    match lookup(name) {
                        Some(value) => format!(
                            "{quote}{}{}{}{quote}",
                            &caps[1],
                            value_as_string(&value),
                            &caps[3]
                        ),
                        None => {
                            notes.push(format!(
                                "code placeholder resolution failed: variable ({name}) is not defined, kept as-is"
                            ));
                            caps[0].to_string()
                        }
                    }
                })
                .into_owned();
            if next != code {
                changed = true;
                code = next;
            }
        }
        if !changed {
            break;
        }
    }

    // Pass 3: bare placeholders in code position.
    RE_PLACEHOLDER
        .replace_all(&code, |caps: &Captures<'_>| {
            let name = caps[1].trim();
            match lookup(name) {
                Some(value) => value_as_code_literal(&value),
                None => {
                    notes.push(format!(
                        "code placeholder resolution failed: variable ({name}) is not defined, kept as-is"
                    ));
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

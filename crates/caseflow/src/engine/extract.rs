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

//! Value extraction from step responses and the variable pool.
//!
//! An extraction names a `source` (response json / xml / text / header /
//! cookie, or the session variable pool) and a `range`: `ALL` takes the
//! whole source, `SOME` applies an expression — JSONPath for JSON bodies,
//! a tag path for XML, a regex for text, a key for headers and cookies,
//! a variable name for the pool. The JSONPath evaluator covers the
//! dotted/indexed/wildcard subset (`$.a.b`, `$.a[0].id`, `$.list[*].name`):
//! a single match yields the value itself, several matches yield a list,
//! none is an error.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::Value;

use crate::engine::placeholder::Lookup;
use crate::error::StepError;

/// Response facets an extraction can read from.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractSources<'a> {
    pub response_json: Option<&'a Value>,
    pub response_text: Option<&'a str>,
    pub response_headers: Option<&'a BTreeMap<String, String>>,
    pub response_cookies: Option<&'a BTreeMap<String, String>>,
}

/// Extracts one value. `label` names the calling pipeline ("extract" or
/// "assert") for error texts.
pub fn extract_from_source(
    source: &str,
    expr: Option<&str>,
    range: Option<&str>,
    index: Option<i64>,
    sources: &ExtractSources<'_>,
    pool: &Lookup<'_>,
    label: &str,
) -> Result<Value, StepError> {
    let range_all = range.map(|r| r.eq_ignore_ascii_case("all")).unwrap_or(false);
    match source.to_ascii_lowercase().as_str() {
        "response json" => {
            let json = sources
                .response_json
                .ok_or_else(|| StepError::parameter(format!("[{label}] response is not valid JSON")))?;
            if range_all {
                return Ok(json.clone());
            }
            let expr = require_expr(expr, label, "a JSONPath expression")?;
            let extracted = resolve_json_path(json, expr)?;
            apply_index(extracted, index, label)
        }
        "response xml" => {
            let text = sources
                .response_text
                .filter(|t| !t.is_empty())
                .ok_or_else(|| StepError::parameter(format!("[{label}] response is not valid XML")))?;
            if range_all {
                return Ok(Value::String(text.to_string()));
            }
            let expr = require_expr(expr, label, "an XPath expression")?;
            let root = parse_xml(text, label)?;
            let matches = find_all(&root, expr);
            if matches.is_empty() {
                return Err(StepError::parameter(format!(
                    "[{label}] XPath expression [{expr}] matched no elements"
                )));
            }
            let node = match index {
                Some(i) => {
                    let i = usize::try_from(i).map_err(|_| {
                        StepError::parameter(format!("[{label}] index must be non-negative: {i}"))
                    })?;
                    matches.get(i).copied().ok_or_else(|| {
                        StepError::parameter(format!(
                            "[{label}] index out of bounds: {i} >= {}",
                            matches.len()
                        ))
                    })?
                }
                None => matches[matches.len() - 1],
            };
            Ok(Value::String(node.text_content()))
        }
        "response text" => {
            let text = sources
                .response_text
                .filter(|t| !t.is_empty())
                .ok_or_else(|| StepError::parameter(format!("[{label}] response has no text body")))?;
            if range_all {
                return Ok(Value::String(text.to_string()));
            }
            let expr = require_expr(expr, label, "a regular expression")?;
            let re = Regex::new(expr).map_err(|e| {
                StepError::parameter(format!("[{label}] invalid regular expression: {e}"))
            })?;
            match re.find(text) {
                Some(found) => Ok(Value::String(found.as_str().to_string())),
                None => Err(StepError::parameter(format!(
                    "[{label}] regular expression [{expr}] matched nothing"
                ))),
            }
        }
        "response header" => {
            let headers = sources
                .response_headers
                .filter(|h| !h.is_empty())
                .ok_or_else(|| StepError::parameter(format!("[{label}] response headers are empty")))?;
            if range_all {
                return Ok(map_to_value(headers));
            }
            let expr = require_expr(expr, label, "a header name")?;
            lookup_map(headers, expr)
                .ok_or_else(|| {
                    StepError::parameter(format!("[{label}] response headers have no entry: {expr}"))
                })
                .map(|v| Value::String(v.to_string()))
        }
        "response cookie" => {
            let cookies = sources
                .response_cookies
                .filter(|c| !c.is_empty())
                .ok_or_else(|| StepError::parameter(format!("[{label}] response cookies are empty")))?;
            if range_all {
                return Ok(map_to_value(cookies));
            }
            let expr = require_expr(expr, label, "a cookie name")?;
            cookies
                .get(expr)
                .cloned()
                .map(Value::String)
                .ok_or_else(|| {
                    StepError::parameter(format!("[{label}] response cookies have no entry: {expr}"))
                })
        }
        "session_variables" | "变量池" => {
            let expr = require_expr(expr, label, "a variable name")?;
            pool(expr).ok_or_else(|| {
                StepError::parameter(format!(
                    "[{label}] variable pool has no entry named [{expr}]"
                ))
            })
        }
        other => Err(StepError::parameter(format!(
            "[{label}] unsupported extraction source: {other}"
        ))),
    }
}

fn require_expr<'e>(expr: Option<&'e str>, label: &str, what: &str) -> Result<&'e str, StepError> {
    match expr {
        Some(e) if !e.trim().is_empty() => Ok(e.trim()),
        _ => Err(StepError::parameter(format!(
            "[{label}] SOME mode requires [expr] to be {what}"
        ))),
    }
}

fn apply_index(extracted: Value, index: Option<i64>, label: &str) -> Result<Value, StepError> {
    match (extracted, index) {
        (Value::Array(items), Some(i)) => {
            let i = usize::try_from(i).map_err(|_| {
                StepError::parameter(format!("[{label}] index must be non-negative: {i}"))
            })?;
            items.get(i).cloned().ok_or_else(|| {
                StepError::parameter(format!(
                    "[{label}] index out of bounds: {i} >= {}",
                    items.len()
                ))
            })
        }
        (value, _) => Ok(value),
    }
}

fn map_to_value(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn lookup_map<'m>(map: &'m BTreeMap<String, String>, key: &str) -> Option<&'m String> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

// ---------------------------------------------------------------------------
// JSONPath subset
// ---------------------------------------------------------------------------

enum PathSegment {
    Key(String),
    Index(i64),
    Wildcard,
}

/// Evaluates a JSONPath expression against `data`.
///
/// One match returns the value itself, several return a list, none is an
/// error — mirroring how extraction rules and assertions consume results.
pub fn resolve_json_path(data: &Value, expr: &str) -> Result<Value, StepError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(StepError::parameter(
            "JSONPath expression must be a non-empty string",
        ));
    }
    if !expr.starts_with("$.") && expr != "$" {
        return Err(StepError::parameter(format!(
            "JSONPath expression must start with $. — got: {expr} (example: $.data.user.name)"
        )));
    }
    let segments = parse_json_path(expr)?;
    let mut current: Vec<&Value> = vec![data];
    for segment in &segments {
        let mut next = Vec::new();
        for value in current {
            match segment {
                PathSegment::Key(key) => {
                    if let Value::Object(map) = value {
                        if let Some(found) = map.get(key) {
                            next.push(found);
                        }
                    }
                }
                PathSegment::Index(i) => {
                    if let Value::Array(items) = value {
                        let len = items.len() as i64;
                        let idx = if *i < 0 { len + i } else { *i };
                        if (0..len).contains(&idx) {
                            next.push(&items[idx as usize]);
                        }
                    }
                }
                PathSegment::Wildcard => match value {
                    Value::Array(items) => next.extend(items.iter()),
                    Value::Object(map) => next.extend(map.values()),
                    _ => {}
                },
            }
        }
        current = next;
    }
    match current.len() {
        0 => Err(StepError::parameter(format!(
            "JSONPath expression {expr} matched nothing in the data source"
        ))),
        1 => Ok(current[0].clone()),
        _ => Ok(Value::Array(current.into_iter().cloned().collect())),
    }
}

fn parse_json_path(expr: &str) -> Result<Vec<PathSegment>, StepError> {
    let mut segments = Vec::new();
    let rest = &expr[1..]; // past '$'
    let bytes: Vec<char> = rest.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            '.' => {
                i += 1;
                if i < bytes.len() && bytes[i] == '*' {
                    segments.push(PathSegment::Wildcard);
                    i += 1;
                    continue;
                }
                let start = i;
                while i < bytes.len() && bytes[i] != '.' && bytes[i] != '[' {
                    i += 1;
                }
                let key: String = bytes[start..i].iter().collect();
                if key.is_empty() {
                    return Err(StepError::parameter(format!(
                        "invalid JSONPath expression: {expr}"
                    )));
                }
                segments.push(PathSegment::Key(key));
            }
            '[' => {
                let close = bytes[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|p| p + i)
                    .ok_or_else(|| {
                        StepError::parameter(format!("unbalanced bracket in JSONPath: {expr}"))
                    })?;
                let inner: String = bytes[i + 1..close].iter().collect();
                let inner = inner.trim();
                if inner == "*" {
                    segments.push(PathSegment::Wildcard);
                } else if let Ok(index) = inner.parse::<i64>() {
                    segments.push(PathSegment::Index(index));
                } else {
                    let unquoted = inner
                        .strip_prefix('\'')
                        .and_then(|s| s.strip_suffix('\''))
                        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
                        .ok_or_else(|| {
                            StepError::parameter(format!(
                                "invalid bracket segment [{inner}] in JSONPath: {expr}"
                            ))
                        })?;
                    segments.push(PathSegment::Key(unquoted.to_string()));
                }
                i = close + 1;
            }
            other => {
                return Err(StepError::parameter(format!(
                    "unexpected character '{other}' in JSONPath: {expr}"
                )))
            }
        }
    }
    Ok(segments)
}

// ---------------------------------------------------------------------------
// XML tag-path lookup
// ---------------------------------------------------------------------------

/// Minimal element tree built for tag-path matching.
pub(crate) struct XmlNode {
    tag: String,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    /// Direct text, or the concatenated descendant text when the element
    /// only wraps other elements.
    fn text_content(&self) -> String {
        if !self.text.trim().is_empty() {
            return self.text.trim().to_string();
        }
        let mut out = String::new();
        for child in &self.children {
            out.push_str(&child.text_content());
        }
        out
    }
}

fn parse_xml(text: &str, label: &str) -> Result<XmlNode, StepError> {
    let mut reader = Reader::from_str(text);
    let mut stack = vec![XmlNode {
        tag: String::new(),
        text: String::new(),
        children: Vec::new(),
    }];
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                stack.push(XmlNode {
                    tag,
                    text: String::new(),
                    children: Vec::new(),
                });
            }
            Ok(Event::Empty(empty)) => {
                let tag = String::from_utf8_lossy(empty.name().as_ref()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode {
                        tag,
                        text: String::new(),
                        children: Vec::new(),
                    });
                }
            }
            Ok(Event::Text(t)) => {
                let chunk = t.unescape().map_err(|e| {
                    StepError::parameter(format!("[{label}] response is not valid XML: {e}"))
                })?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&chunk);
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() > 1 {
                    if let Some(node) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(StepError::parameter(format!(
                    "[{label}] response is not valid XML: {e}"
                )))
            }
        }
    }
    // The document element is the single child of the synthetic wrapper,
    // matching how findall-style paths are rooted.
    stack
        .pop()
        .and_then(|wrapper| wrapper.children.into_iter().next())
        .ok_or_else(|| StepError::parameter(format!("[{label}] response is not valid XML")))
}

/// `findall` over the element tree: `a/b` walks children, a `.//` prefix
/// searches descendants for the first segment, `*` matches any tag.
fn find_all<'n>(root: &'n XmlNode, expr: &str) -> Vec<&'n XmlNode> {
    let expr = expr.trim().trim_start_matches("./");
    let (descend, path) = match expr.strip_prefix("//") {
        Some(rest) => (true, rest),
        None => (false, expr),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Vec::new();
    }
    let mut current: Vec<&XmlNode> = Vec::new();
    if descend {
        collect_descendants(root, segments[0], &mut current);
    } else {
        current = root
            .children
            .iter()
            .filter(|c| segment_matches(segments[0], c))
            .collect();
    }
    for segment in &segments[1..] {
        current = current
            .into_iter()
            .flat_map(|node| node.children.iter().filter(|c| segment_matches(segment, c)))
            .collect();
    }
    current
}

fn segment_matches(segment: &str, node: &XmlNode) -> bool {
    segment == "*" || node.tag == segment
}

fn collect_descendants<'n>(node: &'n XmlNode, tag: &str, out: &mut Vec<&'n XmlNode>) {
    for child in &node.children {
        if segment_matches(tag, child) {
            out.push(child);
        }
        collect_descendants(child, tag, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_pool(_: &str) -> Option<Value> {
        None
    }

    #[test]
    fn test_json_path_single_match_returns_value() {
        let data = json!({"id": 1, "user": {"name": "A"}});
        assert_eq!(resolve_json_path(&data, "$.id").unwrap(), json!(1));
        assert_eq!(resolve_json_path(&data, "$.user.name").unwrap(), json!("A"));
    }

    #[test]
    fn test_json_path_indexing_and_wildcards() {
        let data = json!({"list": [{"id": 1}, {"id": 2}, {"id": 3}]});
        assert_eq!(resolve_json_path(&data, "$.list[0].id").unwrap(), json!(1));
        assert_eq!(resolve_json_path(&data, "$.list[-1].id").unwrap(), json!(3));
        assert_eq!(
            resolve_json_path(&data, "$.list[*].id").unwrap(),
            json!([1, 2, 3])
        );
    }

    #[test]
    fn test_json_path_requires_dollar_dot() {
        let data = json!({"a": 1});
        assert!(resolve_json_path(&data, "a.b").is_err());
        assert!(resolve_json_path(&data, "$.missing").is_err());
    }

    #[test]
    fn test_extract_json_with_index() {
        let data = json!({"ids": [10, 20, 30]});
        let sources = ExtractSources {
            response_json: Some(&data),
            ..Default::default()
        };
        let out = extract_from_source(
            "response json",
            Some("$.ids[*]"),
            Some("SOME"),
            Some(1),
            &sources,
            &no_pool,
            "extract",
        )
        .unwrap();
        assert_eq!(out, json!(20));
    }

    #[test]
    fn test_extract_text_by_regex() {
        let sources = ExtractSources {
            response_text: Some("order=ABC-123 ok"),
            ..Default::default()
        };
        let out = extract_from_source(
            "response text",
            Some(r"ABC-\d+"),
            Some("SOME"),
            None,
            &sources,
            &no_pool,
            "extract",
        )
        .unwrap();
        assert_eq!(out, json!("ABC-123"));
    }

    #[test]
    fn test_extract_header_is_case_insensitive_on_fallback() {
        let headers = BTreeMap::from([("content-type".to_string(), "application/json".to_string())]);
        let sources = ExtractSources {
            response_headers: Some(&headers),
            ..Default::default()
        };
        let out = extract_from_source(
            "response header",
            Some("Content-Type"),
            Some("SOME"),
            None,
            &sources,
            &no_pool,
            "extract",
        )
        .unwrap();
        assert_eq!(out, json!("application/json"));
    }

    #[test]
    fn test_extract_xml_last_match_by_default() {
        let xml = "<root><item>first</item><item>second</item></root>";
        let sources = ExtractSources {
            response_text: Some(xml),
            ..Default::default()
        };
        let out = extract_from_source(
            "response xml",
            Some("item"),
            Some("SOME"),
            None,
            &sources,
            &no_pool,
            "extract",
        )
        .unwrap();
        assert_eq!(out, json!("second"));

        let first = extract_from_source(
            "response xml",
            Some("item"),
            Some("SOME"),
            Some(0),
            &sources,
            &no_pool,
            "extract",
        )
        .unwrap();
        assert_eq!(first, json!("first"));
    }

    #[test]
    fn test_extract_xml_descendant_search() {
        let xml = "<root><outer><inner>x</inner></outer></root>";
        let sources = ExtractSources {
            response_text: Some(xml),
            ..Default::default()
        };
        let out = extract_from_source(
            "response xml",
            Some(".//inner"),
            Some("SOME"),
            None,
            &sources,
            &no_pool,
            "extract",
        )
        .unwrap();
        assert_eq!(out, json!("x"));
    }

    #[test]
    fn test_extract_from_pool() {
        let pool = |name: &str| (name == "token").then(|| json!("abc"));
        let out = extract_from_source(
            "session_variables",
            Some("token"),
            Some("SOME"),
            None,
            &ExtractSources::default(),
            &pool,
            "assert",
        )
        .unwrap();
        assert_eq!(out, json!("abc"));
    }

    #[test]
    fn test_unsupported_source_is_an_error() {
        let err = extract_from_source(
            "response trailer",
            Some("x"),
            None,
            None,
            &ExtractSources::default(),
            &no_pool,
            "extract",
        );
        assert!(err.is_err());
    }
}

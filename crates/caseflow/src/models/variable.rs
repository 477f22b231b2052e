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

//! Variable bindings as they flow through a case run.
//!
//! Pools are ordered lists of `{key, value, desc}` triples rather than
//! maps: order is part of the persisted shape, and an upsert overwrites the
//! existing item in place so later writes supersede earlier ones without
//! reordering the pool.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One `{key, value, desc}` binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableItem {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub desc: String,
}

impl VariableItem {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        VariableItem {
            key: key.into(),
            value,
            desc: String::new(),
        }
    }
}

/// Looks up the value bound to `name`, scanning in order.
pub fn value_from_list<'a>(list: &'a [VariableItem], name: &str) -> Option<&'a Value> {
    list.iter().find(|item| item.key == name).map(|item| &item.value)
}

/// Upserts `items` into `target`: an existing key is overwritten in place,
/// a new key appends.
pub fn upsert_into(target: &mut Vec<VariableItem>, items: Vec<VariableItem>) {
    for item in items {
        if item.key.is_empty() {
            continue;
        }
        match target.iter_mut().find(|existing| existing.key == item.key) {
            Some(existing) => *existing = item,
            None => target.push(item),
        }
    }
}

/// Flattens a binding list into a `name -> value` map (later keys win).
pub fn list_to_map(list: &[VariableItem]) -> BTreeMap<String, Value> {
    list.iter()
        .filter(|item| !item.key.is_empty())
        .map(|item| (item.key.clone(), item.value.clone()))
        .collect()
}

/// Flattens a binding list into the `key -> string` form the HTTP
/// transport consumes (headers, query params, form fields).
pub fn list_to_string_map(list: &[VariableItem]) -> BTreeMap<String, String> {
    list.iter()
        .filter(|item| !item.key.is_empty())
        .map(|item| (item.key.clone(), value_as_string(&item.value)))
        .collect()
}

/// String form of a value: strings render bare (no quotes), scalars via
/// their display form, structures as compact JSON.
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(key: &str, value: Value) -> VariableItem {
        VariableItem::new(key, value)
    }

    #[test]
    fn test_upsert_overwrites_in_place() {
        let mut pool = vec![item("a", json!(1)), item("b", json!(2))];
        upsert_into(&mut pool, vec![item("a", json!(9)), item("c", json!(3))]);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool[0].key, "a");
        assert_eq!(pool[0].value, json!(9));
        assert_eq!(pool[2].key, "c");
    }

    #[test]
    fn test_later_write_supersedes_earlier() {
        let mut pool = Vec::new();
        upsert_into(&mut pool, vec![item("k", json!("v1"))]);
        upsert_into(&mut pool, vec![item("k", json!("v2"))]);
        assert_eq!(value_from_list(&pool, "k"), Some(&json!("v2")));
    }

    #[test]
    fn test_value_as_string_renders_strings_bare() {
        assert_eq!(value_as_string(&json!("abc")), "abc");
        assert_eq!(value_as_string(&json!(7)), "7");
        assert_eq!(value_as_string(&json!(true)), "true");
        assert_eq!(value_as_string(&Value::Null), "");
        assert_eq!(value_as_string(&json!({"a": 1})), "{\"a\":1}");
    }

    #[test]
    fn test_list_to_string_map_skips_empty_keys() {
        let list = vec![item("", json!(1)), item("x", json!("y"))];
        let map = list_to_string_map(&list);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("x").map(String::as_str), Some("y"));
    }
}

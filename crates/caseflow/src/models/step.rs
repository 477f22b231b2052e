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

//! Step records.
//!
//! Steps are stored as flat rows ([`StepRow`]) forming a tree through a
//! nullable, same-case `parent_step_id`; the DAL materializes the
//! normalized recursive shape ([`Step`]) the engine consumes, inlining
//! quote-case trees under `quote_steps`.
//!
//! Structural invariants, validated on write and relied on at run time:
//! - only LOOP and IF steps may have children;
//! - a parent must live in the same case;
//! - parent chains are acyclic;
//! - `quote_case_id` references an existing public-script case.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::{LoopErrorStrategy, LoopMode, RequestArgsType, StepType};
use super::variable::VariableItem;

/// One extraction rule configured on a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRule {
    pub name: String,
    /// Source taxonomy: `response json`, `response xml`, `response text`,
    /// `response header`, `response cookie`, `session_variables`.
    pub source: String,
    /// `ALL` takes the whole source, `SOME` applies `expr`.
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub expr: Option<String>,
    /// Optional list index applied when the expression yields a list.
    #[serde(default)]
    pub index: Option<i64>,
}

/// One assertion rule configured on a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertRule {
    #[serde(default)]
    pub name: Option<String>,
    pub expr: String,
    pub source: String,
    pub operation: String,
    pub except_value: Value,
}

/// A step as persisted: flat, tree structure via `parent_step_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRow {
    pub id: i64,
    pub case_id: i64,
    pub step_no: i64,
    pub step_name: String,
    pub step_desc: Option<String>,
    pub step_code: String,
    pub step_type: StepType,
    pub parent_step_id: Option<i64>,
    pub quote_case_id: Option<i64>,

    // HTTP request configuration
    pub request_url: Option<String>,
    pub request_port: Option<String>,
    pub request_method: Option<String>,
    pub request_header: Vec<VariableItem>,
    pub request_params: Vec<VariableItem>,
    pub request_form_data: Vec<VariableItem>,
    pub request_form_file: Vec<VariableItem>,
    pub request_form_urlencoded: Vec<VariableItem>,
    pub request_body: Option<Value>,
    pub request_text: Option<String>,
    pub request_args_type: Option<RequestArgsType>,
    pub request_project_id: Option<i64>,

    // Script / wait / loop / branch configuration
    pub code: Option<String>,
    pub wait: Option<f64>,
    pub loop_mode: Option<LoopMode>,
    pub loop_maximums: Option<u32>,
    pub loop_interval: Option<f64>,
    pub loop_iterable: Option<String>,
    pub loop_iter_idx: Option<String>,
    pub loop_iter_key: Option<String>,
    pub loop_iter_val: Option<String>,
    pub loop_on_error: Option<LoopErrorStrategy>,
    pub loop_timeout: Option<f64>,
    /// Stored as a JSON value (object, or an array whose first entry is
    /// taken during normalization).
    pub conditions: Option<Value>,

    // Variable and pipeline configuration
    pub session_variables: Vec<VariableItem>,
    pub defined_variables: Vec<VariableItem>,
    pub extract_variables: Vec<ExtractRule>,
    pub assert_validators: Vec<AssertRule>,

    pub created_time: NaiveDateTime,
    pub updated_time: NaiveDateTime,
    pub state: i16,
}

impl StepRow {
    /// A blank row for the given case/slot; ids, codes and timestamps are
    /// filled in by the DAL on insert.
    pub fn new(case_id: i64, step_no: i64, step_name: &str, step_type: StepType) -> Self {
        let ts = chrono::Local::now().naive_local();
        StepRow {
            id: 0,
            case_id,
            step_no,
            step_name: step_name.to_string(),
            step_desc: None,
            step_code: String::new(),
            step_type,
            parent_step_id: None,
            quote_case_id: None,
            request_url: None,
            request_port: None,
            request_method: None,
            request_header: Vec::new(),
            request_params: Vec::new(),
            request_form_data: Vec::new(),
            request_form_file: Vec::new(),
            request_form_urlencoded: Vec::new(),
            request_body: None,
            request_text: None,
            request_args_type: None,
            request_project_id: None,
            code: None,
            wait: None,
            loop_mode: None,
            loop_maximums: None,
            loop_interval: None,
            loop_iterable: None,
            loop_iter_idx: None,
            loop_iter_key: None,
            loop_iter_val: None,
            loop_on_error: None,
            loop_timeout: None,
            conditions: None,
            session_variables: Vec::new(),
            defined_variables: Vec::new(),
            extract_variables: Vec::new(),
            assert_validators: Vec::new(),
            created_time: ts,
            updated_time: ts,
            state: 0,
        }
    }
}

/// The normalized recursive step shape the engine consumes.
///
/// `conditions` is carried as a JSON string here (normalization collapses
/// stored arrays to their first object and serializes it); `children` and
/// `quote_steps` are fully materialized subtrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_id: i64,
    pub case_id: i64,
    pub step_no: i64,
    pub step_code: String,
    pub step_name: String,
    pub step_type: StepType,
    pub parent_step_id: Option<i64>,
    pub quote_case_id: Option<i64>,

    pub request_url: Option<String>,
    pub request_port: Option<String>,
    pub request_method: Option<String>,
    #[serde(default)]
    pub request_header: Vec<VariableItem>,
    #[serde(default)]
    pub request_params: Vec<VariableItem>,
    #[serde(default)]
    pub request_form_data: Vec<VariableItem>,
    #[serde(default)]
    pub request_form_file: Vec<VariableItem>,
    #[serde(default)]
    pub request_form_urlencoded: Vec<VariableItem>,
    pub request_body: Option<Value>,
    pub request_text: Option<String>,
    pub request_args_type: Option<RequestArgsType>,
    pub request_project_id: Option<i64>,

    pub code: Option<String>,
    pub wait: Option<f64>,
    pub loop_mode: Option<LoopMode>,
    pub loop_maximums: Option<u32>,
    pub loop_interval: Option<f64>,
    pub loop_iterable: Option<String>,
    pub loop_iter_idx: Option<String>,
    pub loop_iter_key: Option<String>,
    pub loop_iter_val: Option<String>,
    pub loop_on_error: Option<LoopErrorStrategy>,
    pub loop_timeout: Option<f64>,
    /// Condition object as a JSON string, e.g.
    /// `{"value":"${flag}","operation":"等于","except_value":1,"desc":"..."}`.
    pub conditions: Option<String>,

    #[serde(default)]
    pub session_variables: Vec<VariableItem>,
    #[serde(default)]
    pub defined_variables: Vec<VariableItem>,
    #[serde(default)]
    pub extract_variables: Vec<ExtractRule>,
    #[serde(default)]
    pub assert_validators: Vec<AssertRule>,

    #[serde(default)]
    pub children: Vec<Step>,
    #[serde(default)]
    pub quote_steps: Vec<Step>,
}

impl Step {
    /// Children and inlined quote steps, merged and ordered by `step_no`.
    pub fn ordered_children(&self) -> Vec<&Step> {
        let mut all: Vec<&Step> = self.children.iter().chain(self.quote_steps.iter()).collect();
        all.sort_by_key(|step| step.step_no);
        all
    }
}

/// Recursive step counter produced while materializing a case's tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeCounter {
    /// Root steps directly owned by the case.
    pub direct_steps: u32,
    /// Nested steps below roots (recursively, quote trees excluded).
    pub child_steps: u32,
    /// Steps contributed by quoted public-script cases.
    pub quote_steps: u32,
    pub total_steps: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::StepType;

    fn bare(step_no: i64, step_code: &str) -> Step {
        Step {
            step_id: step_no,
            case_id: 1,
            step_no,
            step_code: step_code.to_string(),
            step_name: format!("step-{step_no}"),
            step_type: StepType::Wait,
            parent_step_id: None,
            quote_case_id: None,
            request_url: None,
            request_port: None,
            request_method: None,
            request_header: Vec::new(),
            request_params: Vec::new(),
            request_form_data: Vec::new(),
            request_form_file: Vec::new(),
            request_form_urlencoded: Vec::new(),
            request_body: None,
            request_text: None,
            request_args_type: None,
            request_project_id: None,
            code: None,
            wait: None,
            loop_mode: None,
            loop_maximums: None,
            loop_interval: None,
            loop_iterable: None,
            loop_iter_idx: None,
            loop_iter_key: None,
            loop_iter_val: None,
            loop_on_error: None,
            loop_timeout: None,
            conditions: None,
            session_variables: Vec::new(),
            defined_variables: Vec::new(),
            extract_variables: Vec::new(),
            assert_validators: Vec::new(),
            children: Vec::new(),
            quote_steps: Vec::new(),
        }
    }

    #[test]
    fn test_ordered_children_merges_quote_steps() {
        let mut parent = bare(1, "p");
        parent.children = vec![bare(3, "c3"), bare(1, "c1")];
        parent.quote_steps = vec![bare(2, "q2")];
        let order: Vec<i64> = parent.ordered_children().iter().map(|s| s.step_no).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}

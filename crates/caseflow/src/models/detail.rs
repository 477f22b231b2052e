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

//! Detail rows: one per executed step instance (per loop cycle).
//!
//! `(report_code, case_code, step_code, num_cycles)` is unique within a
//! run, which is what makes loop iterations individually addressable.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::StepType;
use super::variable::VariableItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detail {
    pub id: i64,
    pub case_id: i64,
    pub case_code: String,
    pub report_code: String,
    pub quote_case_id: Option<i64>,

    pub step_id: i64,
    pub step_no: i64,
    pub step_name: String,
    pub step_code: String,
    pub step_type: StepType,
    pub step_state: bool,
    pub step_st_time: Option<String>,
    pub step_ed_time: Option<String>,
    pub step_elapsed: Option<String>,
    pub step_exec_logger: Option<String>,
    pub step_exec_except: Option<String>,

    pub response_cookie: Option<String>,
    pub response_header: Option<Value>,
    pub response_body: Option<Value>,
    pub response_text: Option<String>,
    pub response_elapsed: Option<String>,

    pub session_variables: Vec<VariableItem>,
    pub defined_variables: Vec<VariableItem>,
    pub extract_variables: Option<Value>,
    pub assert_validators: Option<Value>,

    pub num_cycles: Option<u32>,
    pub created_time: NaiveDateTime,
    pub updated_time: NaiveDateTime,
    pub state: i16,
}

/// Detail-create payload, buffered during deferred-save runs and stamped
/// with the final `report_code` inside the persistence transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDetail {
    pub case_id: i64,
    pub case_code: String,
    pub report_code: String,
    pub quote_case_id: Option<i64>,

    pub step_id: i64,
    pub step_no: i64,
    pub step_name: String,
    pub step_code: String,
    pub step_type: StepType,
    pub step_state: bool,
    pub step_st_time: Option<String>,
    pub step_ed_time: Option<String>,
    pub step_elapsed: Option<String>,
    pub step_exec_logger: Option<String>,
    pub step_exec_except: Option<String>,

    pub response_cookie: Option<String>,
    pub response_header: Option<Value>,
    pub response_body: Option<Value>,
    pub response_text: Option<String>,
    pub response_elapsed: Option<String>,

    pub session_variables: Vec<VariableItem>,
    pub defined_variables: Vec<VariableItem>,
    pub extract_variables: Option<Value>,
    pub assert_validators: Option<Value>,

    pub num_cycles: Option<u32>,
}

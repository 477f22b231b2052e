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

//! Test cases: an ordered tree of steps plus the initial variable pool.
//!
//! `(case_name, case_project, created_user)` is unique among active rows.
//! `case_version` increases monotonically on every successful update.
//! A case flagged `PUBLIC_SCRIPT` is the target of quote steps; deleting
//! it is rejected while any step still references it.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::CaseType;
use super::variable::VariableItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: i64,
    pub case_name: String,
    pub case_desc: Option<String>,
    /// Referenced tag ids.
    pub case_tags: Vec<i64>,
    pub case_type: Option<CaseType>,
    pub case_code: String,
    /// Step count including all nested steps, maintained on writes.
    pub case_steps: u32,
    /// Outcome of the last run (`None` until first executed).
    pub case_state: Option<bool>,
    /// Update counter, bumped on each successful modification.
    pub case_version: u32,
    pub case_project: i64,
    pub case_last_time: Option<NaiveDateTime>,
    /// Initial session variables, merged into the pool at run start.
    pub session_variables: Vec<VariableItem>,
    pub created_user: Option<String>,
    pub created_time: NaiveDateTime,
    pub updated_time: NaiveDateTime,
    pub state: i16,
}

/// The slim case echo handed to the engine alongside the step tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case_id: i64,
    pub case_code: String,
    pub case_name: String,
}

impl Case {
    pub fn summary(&self) -> CaseSummary {
        CaseSummary {
            case_id: self.id,
            case_code: self.case_code.clone(),
            case_name: self.case_name.clone(),
        }
    }
}

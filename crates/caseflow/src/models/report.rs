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

//! Report rows: one per case execution, aggregating step statistics.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::ReportType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub case_id: i64,
    pub case_code: String,
    pub case_st_time: Option<String>,
    pub case_ed_time: Option<String>,
    pub case_elapsed: Option<String>,
    pub case_state: Option<bool>,
    pub step_total: u32,
    pub step_fail_count: u32,
    pub step_pass_count: u32,
    /// Percentage in `[0, 100]`, two decimals.
    pub step_pass_ratio: f64,
    pub batch_code: Option<String>,
    pub report_code: String,
    pub report_type: ReportType,
    pub task_code: Option<String>,
    pub created_user: Option<String>,
    pub created_time: NaiveDateTime,
    pub updated_time: NaiveDateTime,
    pub state: i16,
}

/// Report-create payload. `report_code` is carried explicitly because in
/// deferred-save mode the engine mints it before the row exists, so the
/// details collected during the run can reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub case_id: i64,
    pub case_code: String,
    pub case_st_time: Option<String>,
    pub case_ed_time: Option<String>,
    pub case_elapsed: Option<String>,
    pub case_state: Option<bool>,
    pub step_total: u32,
    pub step_fail_count: u32,
    pub step_pass_count: u32,
    pub step_pass_ratio: f64,
    pub batch_code: Option<String>,
    pub report_code: String,
    pub report_type: ReportType,
    pub task_code: Option<String>,
    pub created_user: Option<String>,
}

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

//! Project records — the ownership root for environments, tags, cases and
//! scheduled tasks. `project_name` is unique among active rows.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub project_name: String,
    pub project_desc: Option<String>,
    pub project_state: Option<String>,
    pub project_code: String,
    pub created_time: NaiveDateTime,
    pub updated_time: NaiveDateTime,
    /// Soft-delete marker: 0 active, 1 deleted.
    pub state: i16,
}

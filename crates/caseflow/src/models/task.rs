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

//! Scheduled task declarations.
//!
//! A task carries exactly one schedule kind (cron / interval / datetime)
//! with its matching expression, an enabled toggle, and a `task_kwargs`
//! payload naming the engine inputs (case ids, environment, initial
//! variables). `(task_name, task_project)` is unique among active rows.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::{TaskScheduler, TaskStatus};
use super::variable::VariableItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: i64,
    pub task_name: String,
    pub task_code: String,
    pub task_desc: Option<String>,
    /// Discriminator isolating engine tasks from unrelated schedules on
    /// the same queue (default `"autotest"`).
    pub task_type: Option<String>,
    pub task_project: i64,
    pub task_kwargs: Value,
    pub last_execute_time: Option<NaiveDateTime>,
    pub last_execute_state: Option<TaskStatus>,
    pub task_scheduler: Option<TaskScheduler>,
    /// Interval schedule, in seconds.
    pub task_interval_expr: Option<i64>,
    /// Absolute-time schedule, `YYYY-MM-DD HH:MM:SS`.
    pub task_datetime_expr: Option<String>,
    /// Cron schedule expression.
    pub task_crontabs_expr: Option<String>,
    pub task_enabled: bool,
    pub created_time: NaiveDateTime,
    pub updated_time: NaiveDateTime,
    pub state: i16,
}

/// Engine inputs carried by `task_kwargs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskKwargs {
    #[serde(default)]
    pub case_ids: Vec<i64>,
    #[serde(default)]
    pub env_name: Option<String>,
    #[serde(default)]
    pub initial_variables: Vec<VariableItem>,
}

impl ScheduledTask {
    /// Decodes `task_kwargs`, tolerating missing fields.
    pub fn kwargs(&self) -> TaskKwargs {
        serde_json::from_value(self.task_kwargs.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kwargs_decoding_tolerates_partial_payloads() {
        let kwargs: TaskKwargs = serde_json::from_value(json!({"case_ids": [42]})).unwrap();
        assert_eq!(kwargs.case_ids, vec![42]);
        assert!(kwargs.env_name.is_none());
        assert!(kwargs.initial_variables.is_empty());
    }
}

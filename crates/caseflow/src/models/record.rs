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

//! Execution records: one per dispatch from the scheduler.
//!
//! The `celery_*` field names are the fixed record layout shared with the
//! queue infrastructure; `celery_id` is the opaque dispatch id and
//! `celery_trace_id` the trace id propagated through message headers.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::{TaskScheduler, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub task_id: Option<i64>,
    pub task_name: Option<String>,
    pub task_kwargs: Value,
    pub task_summary: Option<String>,
    pub task_error: Option<String>,
    pub celery_id: String,
    pub celery_node: Option<String>,
    pub celery_trace_id: Option<String>,
    pub celery_status: TaskStatus,
    pub celery_scheduler: Option<TaskScheduler>,
    pub celery_start_time: Option<NaiveDateTime>,
    pub celery_end_time: Option<NaiveDateTime>,
    /// Human-readable duration, e.g. `"12.34s"`.
    pub celery_duration: Option<String>,
    pub created_time: NaiveDateTime,
    pub updated_time: NaiveDateTime,
}

/// Record-create payload, inserted with status RUNNING at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExecutionRecord {
    pub task_id: Option<i64>,
    pub task_name: Option<String>,
    pub task_kwargs: Value,
    pub celery_id: String,
    pub celery_node: Option<String>,
    pub celery_trace_id: Option<String>,
    pub celery_status: TaskStatus,
    pub celery_scheduler: Option<TaskScheduler>,
    pub celery_start_time: Option<NaiveDateTime>,
}

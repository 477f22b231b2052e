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

//! Execution-record lifecycle around one dispatch.
//!
//! A RUNNING record is inserted before the task body runs; the
//! completion hook finalizes it to SUCCESS or FAILURE with end time and
//! duration. Both writes go through the single worker loop, so updates
//! to the same dispatch id are serialized.

use chrono::Local;
use tracing::info;

use crate::dal::DAL;
use crate::error::Result;
use crate::models::{ExecutionRecord, NewExecutionRecord, ScheduledTask, TaskStatus};

/// Identity of one dispatch: the opaque dispatch id, the trace id
/// propagated through message headers, and the worker node name.
#[derive(Debug, Clone)]
pub struct DispatchIdentity {
    pub celery_id: String,
    pub trace_id: String,
    pub node: String,
}

/// Inserts the RUNNING record for a freshly dispatched task.
pub async fn create_running_record(
    dal: &DAL,
    task: &ScheduledTask,
    identity: &DispatchIdentity,
) -> Result<ExecutionRecord> {
    let record = dal
        .records()
        .create(NewExecutionRecord {
            task_id: Some(task.id),
            task_name: Some(task.task_name.clone()),
            task_kwargs: task.task_kwargs.clone(),
            celery_id: identity.celery_id.clone(),
            celery_node: Some(identity.node.clone()),
            celery_trace_id: Some(identity.trace_id.clone()),
            celery_status: TaskStatus::Running,
            celery_scheduler: task.task_scheduler,
            celery_start_time: Some(Local::now().naive_local()),
        })
        .await?;
    info!(
        trace_id = %identity.trace_id,
        celery_id = %identity.celery_id,
        task_id = task.id,
        "execution record created (RUNNING)"
    );
    Ok(record)
}

/// Finalizes the record for a finished dispatch.
pub async fn finish_record(
    dal: &DAL,
    identity: &DispatchIdentity,
    success: bool,
    summary: &str,
    error: Option<&str>,
) -> Result<ExecutionRecord> {
    let record = dal
        .records()
        .finish(&identity.celery_id, success, summary, error)
        .await?;
    info!(
        trace_id = %identity.trace_id,
        celery_id = %identity.celery_id,
        status = ?record.celery_status,
        "execution record finalized"
    );
    Ok(record)
}

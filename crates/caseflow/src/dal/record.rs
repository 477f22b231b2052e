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

//! Execution-record DAL.
//!
//! A record is inserted with status RUNNING when a task is dispatched and
//! finalized to SUCCESS/FAILURE by the completion callback; the duration
//! is derived from the stored start time at finalization.

use super::{now, DAL};
use crate::error::{Error, Result};
use crate::models::{ExecutionRecord, NewExecutionRecord, TaskStatus};

/// Data access layer for execution-record operations.
#[derive(Clone)]
pub struct RecordDal<'a> {
    dal: &'a DAL,
}

impl<'a> RecordDal<'a> {
    /// Creates a new RecordDal instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn create(&self, new: NewExecutionRecord) -> Result<ExecutionRecord> {
        let mut store = self.dal.database.write();
        let ts = now();
        let record = ExecutionRecord {
            id: store.allocate_id(),
            task_id: new.task_id,
            task_name: new.task_name,
            task_kwargs: new.task_kwargs,
            task_summary: None,
            task_error: None,
            celery_id: new.celery_id,
            celery_node: new.celery_node,
            celery_trace_id: new.celery_trace_id,
            celery_status: new.celery_status,
            celery_scheduler: new.celery_scheduler,
            celery_start_time: new.celery_start_time,
            celery_end_time: None,
            celery_duration: None,
            created_time: ts,
            updated_time: ts,
        };
        store.records.push(record.clone());
        Ok(record)
    }

    pub async fn get_by_celery_id(&self, celery_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self
            .dal
            .database
            .read()
            .records
            .iter()
            .find(|r| r.celery_id == celery_id)
            .cloned())
    }

    /// Finalizes a record: terminal status, end time, duration, summary
    /// on success or error text on failure.
    pub async fn finish(
        &self,
        celery_id: &str,
        success: bool,
        summary: &str,
        error: Option<&str>,
    ) -> Result<ExecutionRecord> {
        let mut store = self.dal.database.write();
        let end_time = now();
        let record = store
            .records
            .iter_mut()
            .find(|r| r.celery_id == celery_id)
            .ok_or_else(|| Error::not_found("record", format!("celery_id={celery_id}")))?;
        record.celery_status = if success {
            TaskStatus::Success
        } else {
            TaskStatus::Failure
        };
        record.celery_end_time = Some(end_time);
        if let Some(start) = record.celery_start_time {
            let elapsed = (end_time - start).num_milliseconds() as f64 / 1000.0;
            record.celery_duration = Some(format!("{elapsed:.2}s"));
        }
        record.task_summary = Some(summary.trim().to_string());
        record.task_error = if success {
            None
        } else {
            Some(error.unwrap_or(summary).to_string())
        };
        record.updated_time = end_time;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_lifecycle_running_to_success() {
        let dal = DAL::new(Database::new());
        let record = dal
            .records()
            .create(NewExecutionRecord {
                task_id: Some(1),
                task_name: Some("nightly".into()),
                task_kwargs: json!({"case_ids": [42]}),
                celery_id: "dispatch-1".into(),
                celery_node: Some("caseflow-worker".into()),
                celery_trace_id: Some("trace-1".into()),
                celery_status: TaskStatus::Running,
                celery_scheduler: None,
                celery_start_time: Some(super::now()),
            })
            .await
            .unwrap();
        assert_eq!(record.celery_status, TaskStatus::Running);

        let finished = dal
            .records()
            .finish("dispatch-1", true, "1 case passed", None)
            .await
            .unwrap();
        assert_eq!(finished.celery_status, TaskStatus::Success);
        assert!(finished.celery_end_time.is_some());
        assert!(finished.celery_duration.is_some());
        assert!(finished.task_error.is_none());
    }
}

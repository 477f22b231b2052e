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

//! Scheduled-task DAL.

use chrono::NaiveDateTime;

use super::{now, DAL};
use crate::error::{Error, Result};
use crate::models::{unique_identify, ScheduledTask, TaskStatus};

/// Data access layer for scheduled-task operations.
#[derive(Clone)]
pub struct TaskDal<'a> {
    dal: &'a DAL,
}

impl<'a> TaskDal<'a> {
    /// Creates a new TaskDal instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a task; `(task_name, task_project)` must be unique among
    /// active rows. Ids, codes and timestamps on the payload are replaced.
    pub async fn create(&self, mut task: ScheduledTask) -> Result<ScheduledTask> {
        let mut store = self.dal.database.write();
        if store.tasks.iter().any(|t| {
            t.state == 0 && t.task_project == task.task_project && t.task_name == task.task_name
        }) {
            return Err(Error::conflict(format!(
                "task already exists: name={}, project={}",
                task.task_name, task.task_project
            )));
        }
        task.id = store.allocate_id();
        if task.task_code.is_empty() {
            task.task_code = unique_identify();
        }
        let ts = now();
        task.created_time = ts;
        task.updated_time = ts;
        task.state = 0;
        store.tasks.push(task.clone());
        Ok(task)
    }

    pub async fn get_by_id(&self, task_id: i64) -> Result<ScheduledTask> {
        self.dal
            .database
            .read()
            .tasks
            .iter()
            .find(|t| t.id == task_id && t.state == 0)
            .cloned()
            .ok_or_else(|| Error::not_found("task", format!("id={task_id}")))
    }

    /// Enabled, non-deleted tasks carrying a schedule, filtered by
    /// `task_type` — the scan loop's working set.
    pub async fn list_scheduled(&self, task_type: &str) -> Result<Vec<ScheduledTask>> {
        if task_type.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .dal
            .database
            .read()
            .tasks
            .iter()
            .filter(|t| {
                t.state == 0
                    && t.task_enabled
                    && t.task_scheduler.is_some()
                    && t.task_type.as_deref() == Some(task_type)
            })
            .cloned()
            .collect())
    }

    /// Advances a task's last-execution bookkeeping.
    pub async fn update_last_execution(
        &self,
        task_id: i64,
        last_execute_time: NaiveDateTime,
        last_execute_state: Option<TaskStatus>,
    ) -> Result<()> {
        let mut store = self.dal.database.write();
        let task = store
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id && t.state == 0)
            .ok_or_else(|| Error::not_found("task", format!("id={task_id}")))?;
        task.last_execute_time = Some(last_execute_time);
        if last_execute_state.is_some() {
            task.last_execute_state = last_execute_state;
        }
        task.updated_time = now();
        Ok(())
    }
}

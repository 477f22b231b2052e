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

//! Scheduler scan & dispatch.
//!
//! A periodic sweep lists the enabled, scheduled tasks of the configured
//! `task_type` and computes which are due:
//!
//! - `cron`: next fire after the last execution (or creation) time is at
//!   or before now;
//! - `interval`: the interval has elapsed since the last execution, or
//!   the task never ran;
//! - `datetime`: the absolute time has passed and the task has not run
//!   at or after it.
//!
//! Each due task is dispatched with a fresh trace id: the RUNNING record
//! is written (repository binding composed into the same submitted
//! future), the engine body runs through the worker pool, the record is
//! finalized, and the task's last-execution bookkeeping advances.
//! [`TaskScheduler::scan_and_dispatch`] is deliberately synchronous — it
//! is the scheduler-callback entry — while [`TaskScheduler::run_forever`]
//! wraps it in a periodic loop for embedding.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, TimeZone};
use croner::Cron;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::pool::{bind_repository, global_worker_pool};
use super::records::{self, DispatchIdentity};
use crate::config::SchedulerConfig;
use crate::database::Database;
use crate::error::Result;
use crate::models::{ReportType, ScheduledTask, TaskScheduler as ScheduleKind, TaskStatus};
use crate::runner::CaseRunner;

/// The scan-and-dispatch driver.
pub struct TaskScheduler {
    database: Database,
    runner: CaseRunner,
    config: SchedulerConfig,
}

impl TaskScheduler {
    pub fn new(database: Database, runner: CaseRunner, config: SchedulerConfig) -> Self {
        TaskScheduler {
            database,
            runner,
            config,
        }
    }

    /// One synchronous sweep: find due tasks and run each through the
    /// worker pool. Returns the dispatch ids issued this sweep.
    pub fn scan_and_dispatch(&self) -> Result<Vec<String>> {
        let pool = global_worker_pool()?;
        // Scan pre-run hook: make sure the repository is bound; no record
        // is written for the scan itself.
        let database = self.database.clone();
        let dal = pool.run(async move { bind_repository(&database) })?;

        let task_type = self.config.task_type.clone();
        let tasks = pool.run({
            let dal = dal.clone();
            async move { dal.tasks().list_scheduled(&task_type).await }
        })??;
        let now = Local::now().naive_local();
        debug!(candidates = tasks.len(), "scheduler scan");

        let mut dispatched = Vec::new();
        for task in tasks {
            if !is_due(&task, now) {
                continue;
            }
            match self.dispatch(&task, now) {
                Ok(celery_id) => dispatched.push(celery_id),
                Err(err) => {
                    error!(task_id = task.id, %err, "dispatch failed");
                }
            }
        }
        Ok(dispatched)
    }

    /// Runs one due task through its full record lifecycle.
    fn dispatch(&self, task: &ScheduledTask, now: NaiveDateTime) -> Result<String> {
        let pool = global_worker_pool()?;
        let identity = DispatchIdentity {
            celery_id: Uuid::new_v4().to_string(),
            trace_id: Uuid::new_v4().to_string(),
            node: self.config.node_name.clone(),
        };
        info!(
            trace_id = %identity.trace_id,
            celery_id = %identity.celery_id,
            task_id = task.id,
            task_name = %task.task_name,
            "task due, dispatching"
        );

        // Pre-run: bind-then-create composed in one submitted future so
        // the repository binding and its first use share the loop.
        pool.run({
            let database = self.database.clone();
            let task = task.clone();
            let identity = identity.clone();
            async move {
                let dal = bind_repository(&database);
                records::create_running_record(&dal, &task, &identity).await
            }
        })??;

        // Body: the engine invocation itself.
        let kwargs = task.kwargs();
        let runner = self.runner.clone();
        let task_code = task.task_code.clone();
        let body = pool.run(async move {
            runner
                .batch_execute_cases(
                    &kwargs.case_ids,
                    ReportType::AsyncExec,
                    kwargs.initial_variables,
                    kwargs.env_name,
                    Some(task_code),
                )
                .await
        })?;

        // Completion: finalize the record; a body error marks FAILURE,
        // case-level failures are still a successful dispatch and land
        // in the summary.
        let (success, summary, error_text) = match &body {
            Ok(batch) => (
                true,
                format!(
                    "{} of {} cases passed",
                    batch.success_cases, batch.total_cases
                ),
                None,
            ),
            Err(err) => (false, String::new(), Some(err.to_string())),
        };
        pool.run({
            let database = self.database.clone();
            let identity = identity.clone();
            let summary = summary.clone();
            async move {
                let dal = bind_repository(&database);
                records::finish_record(
                    &dal,
                    &identity,
                    success,
                    &summary,
                    error_text.as_deref(),
                )
                .await
            }
        })??;

        // Advance the task bookkeeping so the next sweep sees this run.
        let status = if success {
            TaskStatus::Success
        } else {
            TaskStatus::Failure
        };
        pool.run({
            let database = self.database.clone();
            let task_id = task.id;
            async move {
                let dal = bind_repository(&database);
                dal.tasks()
                    .update_last_execution(task_id, now, Some(status))
                    .await
            }
        })??;

        body.map(|_| identity.celery_id)
    }

    /// Periodic embedding of the sweep: tick, scan, repeat.
    pub async fn run_forever(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.scan_interval);
        loop {
            ticker.tick().await;
            let scheduler = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || scheduler.scan_and_dispatch()).await {
                Ok(Ok(dispatched)) if !dispatched.is_empty() => {
                    info!(count = dispatched.len(), "scan dispatched tasks");
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => error!(%err, "scheduler sweep failed"),
                Err(err) => error!(%err, "scheduler sweep panicked"),
            }
        }
    }
}

/// Whether a task is due at `now`.
pub fn is_due(task: &ScheduledTask, now: NaiveDateTime) -> bool {
    let Some(kind) = task.task_scheduler else {
        return false;
    };
    let last_run = task.last_execute_time;
    match kind {
        ScheduleKind::Cron => {
            let Some(expr) = task
                .task_crontabs_expr
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
            else {
                return false;
            };
            let base = last_run.unwrap_or(task.created_time);
            cron_due(expr, base, now, task.id)
        }
        ScheduleKind::Interval => {
            let seconds = task.task_interval_expr.unwrap_or_default();
            if seconds <= 0 {
                return false;
            }
            match last_run {
                None => true,
                Some(last) => (now - last).num_seconds() >= seconds,
            }
        }
        ScheduleKind::Datetime => {
            let Some(expr) = task
                .task_datetime_expr
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
            else {
                return false;
            };
            let Ok(target) = NaiveDateTime::parse_from_str(expr, "%Y-%m-%d %H:%M:%S") else {
                warn!(task_id = task.id, expr, "invalid datetime expression");
                return false;
            };
            if let Some(last) = last_run {
                if last >= target {
                    return false;
                }
            }
            now >= target
        }
    }
}

fn cron_due(expr: &str, base: NaiveDateTime, now: NaiveDateTime, task_id: i64) -> bool {
    let cron = match Cron::new(expr).with_seconds_optional().parse() {
        Ok(cron) => cron,
        Err(err) => {
            warn!(task_id, expr, %err, "invalid cron expression");
            return false;
        }
    };
    let Some(base_local) = Local.from_local_datetime(&base).single() else {
        return false;
    };
    match cron.find_next_occurrence(&base_local, false) {
        Ok(next) => next.naive_local() <= now,
        Err(err) => {
            warn!(task_id, expr, %err, "cron schedule has no next occurrence");
            false
        }
    }
}

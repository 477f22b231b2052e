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

//! Scheduler scenarios: the scan sweep dispatching due tasks through the
//! worker pool, with the full execution-record lifecycle. These tests are
//! deliberately synchronous — the sweep is the scheduler-callback entry —
//! and serialized because the worker pool is process-wide.

use chrono::{Duration, Local};
use serde_json::json;
use serial_test::serial;

use caseflow::config::SchedulerConfig;
use caseflow::dal::DAL;
use caseflow::models::{ScheduledTask, StepRow, StepType, TaskScheduler as ScheduleKind, TaskStatus};
use caseflow::runner::CaseRunner;
use caseflow::scheduler::{reset_process_state, TaskScheduler};

use crate::fixtures::{fresh_dal, seed_case, seed_project, seed_step};

async fn seed_runnable_case(dal: &DAL) -> i64 {
    let project = seed_project(dal).await;
    let case = seed_case(dal, &project, "scheduled case").await;
    let mut step = StepRow::new(case.id, 1, "quick wait", StepType::Wait);
    step.wait = Some(0.0);
    seed_step(dal, step).await;
    case.id
}

fn cron_task(case_id: i64) -> ScheduledTask {
    let now = Local::now().naive_local();
    ScheduledTask {
        id: 0,
        task_name: "hourly regression".into(),
        task_code: String::new(),
        task_desc: None,
        task_type: Some("autotest".into()),
        task_project: 1,
        task_kwargs: json!({"case_ids": [case_id]}),
        last_execute_time: None,
        last_execute_state: None,
        task_scheduler: Some(ScheduleKind::Cron),
        task_interval_expr: None,
        task_datetime_expr: None,
        task_crontabs_expr: Some("0 * * * *".into()),
        task_enabled: true,
        created_time: now - Duration::hours(2),
        updated_time: now,
        state: 0,
    }
}

#[test]
#[serial]
fn test_cron_dispatch_writes_and_finalizes_the_record() {
    reset_process_state();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dal = fresh_dal();
    let (case_id, task) = runtime.block_on(async {
        let case_id = seed_runnable_case(&dal).await;
        let task = dal.tasks().create(cron_task(case_id)).await.unwrap();
        (case_id, task)
    });

    let scheduler = TaskScheduler::new(
        dal.database().clone(),
        CaseRunner::new(dal.clone()),
        SchedulerConfig::default(),
    );
    let dispatched = scheduler.scan_and_dispatch().unwrap();
    assert_eq!(dispatched.len(), 1, "exactly one dispatch expected");

    runtime.block_on(async {
        let record = dal
            .records()
            .get_by_celery_id(&dispatched[0])
            .await
            .unwrap()
            .expect("record inserted for the dispatch");
        assert_eq!(record.celery_status, TaskStatus::Success);
        assert!(record.celery_end_time.is_some());
        assert!(record.celery_duration.is_some());
        assert!(record.celery_trace_id.is_some());
        assert_eq!(record.celery_scheduler, Some(ScheduleKind::Cron));
        assert_eq!(record.task_name.as_deref(), Some("hourly regression"));

        // The engine actually ran: one report exists for the case.
        let reports = dal.reports().list_by_case(case_id).await.unwrap();
        assert_eq!(reports.len(), 1);

        // The task bookkeeping advanced.
        let reloaded = dal.tasks().get_by_id(task.id).await.unwrap();
        assert!(reloaded.last_execute_time.is_some());
        assert_eq!(reloaded.last_execute_state, Some(TaskStatus::Success));
    });

    // An immediate second sweep finds nothing due: the next cron fire is
    // in the future now.
    let again = scheduler.scan_and_dispatch().unwrap();
    assert!(again.is_empty());
    reset_process_state();
}

#[test]
#[serial]
fn test_scan_ignores_foreign_task_types_and_disabled_tasks() {
    reset_process_state();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dal = fresh_dal();
    runtime.block_on(async {
        let case_id = seed_runnable_case(&dal).await;
        let mut foreign = cron_task(case_id);
        foreign.task_name = "someone else's schedule".into();
        foreign.task_type = Some("reporting".into());
        dal.tasks().create(foreign).await.unwrap();

        let mut disabled = cron_task(case_id);
        disabled.task_name = "switched off".into();
        disabled.task_enabled = false;
        dal.tasks().create(disabled).await.unwrap();
    });

    let scheduler = TaskScheduler::new(
        dal.database().clone(),
        CaseRunner::new(dal.clone()),
        SchedulerConfig::default(),
    );
    let dispatched = scheduler.scan_and_dispatch().unwrap();
    assert!(dispatched.is_empty());
    reset_process_state();
}

#[test]
#[serial]
fn test_interval_task_dispatches_and_respects_the_gap() {
    reset_process_state();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dal = fresh_dal();
    runtime.block_on(async {
        let case_id = seed_runnable_case(&dal).await;
        let mut task = cron_task(case_id);
        task.task_name = "interval task".into();
        task.task_scheduler = Some(ScheduleKind::Interval);
        task.task_crontabs_expr = None;
        task.task_interval_expr = Some(600);
        dal.tasks().create(task).await.unwrap();
    });

    let scheduler = TaskScheduler::new(
        dal.database().clone(),
        CaseRunner::new(dal.clone()),
        SchedulerConfig::default(),
    );
    // Never ran: due immediately.
    assert_eq!(scheduler.scan_and_dispatch().unwrap().len(), 1);
    // Just ran: the 600 s gap has not elapsed.
    assert!(scheduler.scan_and_dispatch().unwrap().is_empty());
    reset_process_state();
}

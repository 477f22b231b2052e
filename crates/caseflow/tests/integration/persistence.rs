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

//! Repository scenarios: the atomic run-persistence transaction and the
//! ownership guards around deletions.

use caseflow::models::{NewDetail, NewReport, ReportType, StepRow, StepType};

use crate::fixtures::{fresh_dal, seed_case, seed_project, seed_public_case, seed_step};

fn report_for(case_id: i64, case_code: &str) -> NewReport {
    NewReport {
        case_id,
        case_code: case_code.to_string(),
        case_st_time: None,
        case_ed_time: None,
        case_elapsed: Some("0.100".into()),
        case_state: Some(true),
        step_total: 1,
        step_fail_count: 0,
        step_pass_count: 1,
        step_pass_ratio: 100.0,
        batch_code: None,
        report_code: String::new(),
        report_type: ReportType::SyncExec,
        task_code: None,
        created_user: None,
    }
}

fn detail_for(case_id: i64, case_code: &str, step_code: &str, num_cycles: Option<u32>) -> NewDetail {
    NewDetail {
        case_id,
        case_code: case_code.to_string(),
        report_code: String::new(),
        quote_case_id: None,
        step_id: 1,
        step_no: 1,
        step_name: "step".into(),
        step_code: step_code.to_string(),
        step_type: StepType::Wait,
        step_state: true,
        step_st_time: None,
        step_ed_time: None,
        step_elapsed: Some("0.001".into()),
        step_exec_logger: None,
        step_exec_except: None,
        response_cookie: None,
        response_header: None,
        response_body: None,
        response_text: None,
        response_elapsed: None,
        session_variables: Vec::new(),
        defined_variables: Vec::new(),
        extract_variables: None,
        assert_validators: None,
        num_cycles,
    }
}

#[tokio::test]
async fn test_persist_case_run_is_atomic() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;
    let case = seed_case(&dal, &project, "atomic").await;

    // Duplicate detail keys make the second insert fail mid-transaction.
    let details = vec![
        detail_for(case.id, &case.case_code, "step-1", Some(1)),
        detail_for(case.id, &case.case_code, "step-1", Some(1)),
    ];
    let err = dal
        .persist_case_run(
            report_for(case.id, &case.case_code),
            details,
            true,
            Some(chrono::Local::now().naive_local()),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("detail already exists"));

    // Nothing of the run landed: no report, no details, case untouched.
    assert!(dal.reports().list_by_case(case.id).await.unwrap().is_empty());
    let reloaded = dal.cases().get_by_id(case.id).await.unwrap();
    assert_eq!(reloaded.case_state, None);
    assert!(reloaded.case_last_time.is_none());

    // The same payload with distinct cycles commits all three writes.
    let details = vec![
        detail_for(case.id, &case.case_code, "step-1", Some(1)),
        detail_for(case.id, &case.case_code, "step-1", Some(2)),
    ];
    let report_code = dal
        .persist_case_run(
            report_for(case.id, &case.case_code),
            details,
            true,
            Some(chrono::Local::now().naive_local()),
        )
        .await
        .unwrap();
    assert_eq!(
        dal.details().list_by_report(&report_code).await.unwrap().len(),
        2
    );
    let reloaded = dal.cases().get_by_id(case.id).await.unwrap();
    assert_eq!(reloaded.case_state, Some(true));
}

#[tokio::test]
async fn test_quoted_case_cannot_be_deleted() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;
    let shared = seed_public_case(&dal, &project, "shared").await;
    let mut inner = StepRow::new(shared.id, 1, "noop", StepType::Wait);
    inner.wait = Some(0.0);
    seed_step(&dal, inner).await;

    let case = seed_case(&dal, &project, "quoting").await;
    let mut quote = StepRow::new(case.id, 1, "quote", StepType::Quote);
    quote.quote_case_id = Some(shared.id);
    seed_step(&dal, quote).await;

    assert!(dal.cases().delete(shared.id).await.is_err());
    // Dropping the quoting case releases the reference.
    dal.cases().delete(case.id).await.unwrap();
    assert!(dal.cases().delete(shared.id).await.is_ok());
}

#[tokio::test]
async fn test_project_deletion_guarded_by_ownership() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;
    let case = seed_case(&dal, &project, "owned").await;
    assert!(dal.projects().delete(project.id).await.is_err());
    dal.cases().delete(case.id).await.unwrap();
    dal.projects().delete(project.id).await.unwrap();
}

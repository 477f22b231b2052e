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

//! Case-runner scenarios: persisted reports and details, loop cycles in
//! detail rows, quote-case inlining, batch accumulation.

use serde_json::json;

use caseflow::models::{
    AssertRule, CaseType, ExtractRule, LoopErrorStrategy, LoopMode, ReportType, StepRow, StepType,
    VariableItem,
};
use caseflow::runner::CaseRunner;

use crate::fixtures::{
    fresh_dal, json_response, seed_case, seed_project, seed_public_case, seed_step,
    FixtureHttpClient,
};

#[tokio::test]
async fn test_single_case_run_persists_report_details_and_case_state() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;
    let case = seed_case(&dal, &project, "persisting run").await;

    let mut http = StepRow::new(case.id, 1, "get user", StepType::Http);
    http.request_url = Some("https://api.example/users/1".into());
    http.request_method = Some("GET".into());
    http.extract_variables = vec![ExtractRule {
        name: "uid".into(),
        source: "response json".into(),
        range: Some("SOME".into()),
        expr: Some("$.id".into()),
        index: None,
    }];
    seed_step(&dal, http).await;

    let client = FixtureHttpClient::returning_json(200, &json!({"id": 1}));
    let runner = CaseRunner::new(dal.clone()).with_http_client(client);
    let summary = runner
        .execute_single_case(case.id, ReportType::SyncExec, vec![], None, None, None)
        .await
        .unwrap();

    assert!(summary.success);
    assert!(summary.saved_to_database);
    assert_eq!(summary.total_steps, 1);
    assert_eq!(summary.failed_steps, 0);
    assert_eq!(summary.pass_ratio, 100.0);

    let report_code = summary.report_code.as_deref().unwrap();
    let report = dal.reports().get_by_code(report_code).await.unwrap();
    assert_eq!(report.step_total, 1);
    assert_eq!(report.case_state, Some(true));

    let details = dal.details().list_by_report(report_code).await.unwrap();
    assert_eq!(details.len(), 1);
    assert!(details[0].step_state);
    // The session snapshot carries the extracted variable.
    assert!(details[0]
        .session_variables
        .iter()
        .any(|item| item.key == "uid" && item.value == json!(1)));

    let reloaded = dal.cases().get_by_id(case.id).await.unwrap();
    assert_eq!(reloaded.case_state, Some(true));
    assert!(reloaded.case_last_time.is_some());
}

#[tokio::test]
async fn test_count_loop_with_continue_produces_cycle_details() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;
    let case = seed_case(&dal, &project, "loop continue").await;

    let mut looped = StepRow::new(case.id, 1, "retry thrice", StepType::Loop);
    looped.loop_mode = Some(LoopMode::Count);
    looped.loop_maximums = Some(3);
    looped.loop_interval = Some(0.0);
    looped.loop_on_error = Some(LoopErrorStrategy::Continue);
    let looped = seed_step(&dal, looped).await;

    let mut probe = StepRow::new(case.id, 2, "probe", StepType::Http);
    probe.parent_step_id = Some(looped.id);
    probe.request_url = Some("https://api.example/probe".into());
    probe.request_method = Some("GET".into());
    probe.assert_validators = vec![AssertRule {
        name: Some("status ok".into()),
        expr: "$.code".into(),
        source: "response json".into(),
        operation: "等于".into(),
        except_value: json!(200),
    }];
    seed_step(&dal, probe).await;

    // The server only answers 200 on the second call.
    let client = FixtureHttpClient::with_queue(vec![
        json_response(200, &json!({"code": 500})),
        json_response(200, &json!({"code": 200})),
        json_response(200, &json!({"code": 500})),
    ]);
    let runner = CaseRunner::new(dal.clone()).with_http_client(client.clone());
    let summary = runner
        .execute_single_case(case.id, ReportType::SyncExec, vec![], None, None, None)
        .await
        .unwrap();

    // CONTINUE ran all three iterations; the loop (and the case) failed.
    assert!(!summary.success);
    assert!(summary.failed_steps >= 1);
    assert_eq!(client.requests.lock().len(), 3);

    let report_code = summary.report_code.as_deref().unwrap();
    let details = dal.details().list_by_report(report_code).await.unwrap();
    let mut probe_cycles: Vec<u32> = details
        .iter()
        .filter(|d| d.step_name == "probe")
        .filter_map(|d| d.num_cycles)
        .collect();
    probe_cycles.sort_unstable();
    assert_eq!(probe_cycles, vec![1, 2, 3]);

    // Detail uniqueness held across cycles.
    let mut keys: Vec<(String, Option<u32>)> = details
        .iter()
        .map(|d| (d.step_code.clone(), d.num_cycles))
        .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), details.len());
}

#[tokio::test]
async fn test_quote_case_runs_inline_with_shared_variables() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;
    let shared = seed_public_case(&dal, &project, "shared login").await;

    let mut token_step = StepRow::new(shared.id, 1, "mint token", StepType::Python);
    token_step.code = Some("result = {\"token\": \"tok-1\"}".into());
    seed_step(&dal, token_step).await;

    let case = seed_case(&dal, &project, "quoting case").await;
    let mut quote = StepRow::new(case.id, 1, "use shared login", StepType::Quote);
    quote.quote_case_id = Some(shared.id);
    seed_step(&dal, quote).await;

    let mut call = StepRow::new(case.id, 2, "authorized call", StepType::Http);
    call.request_url = Some("https://api.example/me?token=${token}".into());
    call.request_method = Some("GET".into());
    seed_step(&dal, call).await;

    let client = FixtureHttpClient::returning_json(200, &json!({"ok": true}));
    let runner = CaseRunner::new(dal.clone()).with_http_client(client.clone());
    let summary = runner
        .execute_single_case(case.id, ReportType::SyncExec, vec![], None, None, None)
        .await
        .unwrap();

    assert!(summary.success, "quote run failed: {:?}", summary.error);
    // The token minted inside the quoted case flowed into the caller.
    assert_eq!(
        client.seen_urls(),
        vec!["https://api.example/me?token=tok-1"]
    );
}

#[tokio::test]
async fn test_quote_of_private_case_fails_the_step() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;
    let private = seed_case(&dal, &project, "not shared").await;
    let mut inner = StepRow::new(private.id, 1, "noop", StepType::Python);
    inner.code = Some("result = {\"x\": 1}".into());
    seed_step(&dal, inner).await;

    let case = seed_case(&dal, &project, "quoting private").await;
    let mut quote = StepRow::new(case.id, 1, "bad quote", StepType::Quote);
    quote.quote_case_id = Some(private.id);
    seed_step(&dal, quote).await;

    let client = FixtureHttpClient::returning_json(200, &json!({}));
    let runner = CaseRunner::new(dal.clone()).with_http_client(client);
    let summary = runner
        .execute_single_case(case.id, ReportType::SyncExec, vec![], None, None, None)
        .await
        .unwrap();
    assert!(!summary.success);
}

#[tokio::test]
async fn test_case_without_steps_is_a_parameter_error() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;
    let case = seed_case(&dal, &project, "empty case").await;

    let runner = CaseRunner::new(dal.clone());
    let err = runner
        .execute_single_case(case.id, ReportType::SyncExec, vec![], None, None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no executable root steps"));
}

#[tokio::test]
async fn test_batch_run_accumulates_per_case_outcomes() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;

    let passing = seed_case(&dal, &project, "passing").await;
    let mut ok_step = StepRow::new(passing.id, 1, "ok", StepType::Python);
    ok_step.code = Some("result = {\"fine\": 1}".into());
    seed_step(&dal, ok_step).await;

    let failing = seed_case(&dal, &project, "failing").await;
    let mut bad_step = StepRow::new(failing.id, 1, "bad", StepType::Python);
    bad_step.code = Some("result = {\"x\": missing_reference}".into());
    seed_step(&dal, bad_step).await;

    let client = FixtureHttpClient::returning_json(200, &json!({}));
    let runner = CaseRunner::new(dal.clone()).with_http_client(client);
    let batch = runner
        .batch_execute_cases(
            &[passing.id, failing.id, 424242],
            ReportType::SyncExec,
            vec![],
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(batch.total_cases, 3);
    assert_eq!(batch.success_cases, 1);
    assert_eq!(batch.failed_cases, 2);
    assert!(!batch.summary.all_success);
    assert!((batch.summary.success_rate - 1.0 / 3.0).abs() < 1e-9);
    // The unknown case id landed as an error entry, not a crash.
    assert!(batch.results[2].error.is_some());
    // Both real runs share a batch code through their reports.
    let code_a = batch.results[0].report_code.as_deref().unwrap();
    let code_b = batch.results[1].report_code.as_deref().unwrap();
    let report_a = dal.reports().get_by_code(code_a).await.unwrap();
    let report_b = dal.reports().get_by_code(code_b).await.unwrap();
    assert_eq!(report_a.batch_code, report_b.batch_code);
    assert!(report_a.batch_code.is_some());
}

#[tokio::test]
async fn test_initial_variables_override_case_level_bindings() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;
    let case = dal
        .cases()
        .create(
            project.id,
            "layered vars",
            Some(CaseType::PrivateScript),
            vec![VariableItem::new("who", json!("case-level"))],
            Some("qa"),
        )
        .await
        .unwrap();
    let mut call = StepRow::new(case.id, 1, "hello", StepType::Http);
    call.request_url = Some("https://api.example/hello/${who}".into());
    call.request_method = Some("GET".into());
    seed_step(&dal, call).await;

    let client = FixtureHttpClient::returning_json(200, &json!({}));
    let runner = CaseRunner::new(dal.clone()).with_http_client(client.clone());
    runner
        .execute_single_case(
            case.id,
            ReportType::SyncExec,
            vec![VariableItem::new("who", json!("caller"))],
            None,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(client.seen_urls(), vec!["https://api.example/hello/caller"]);
}

#[tokio::test]
async fn test_debug_single_step_persists_nothing() {
    let dal = fresh_dal();
    let client = FixtureHttpClient::returning_json(200, &json!({"pong": 1}));
    let runner = CaseRunner::new(dal.clone()).with_http_client(client);

    let mut step = crate::fixtures::bare_step(7, 1, "ping", StepType::Http);
    step.request_url = Some("https://api.example/ping".into());
    step.request_method = Some("GET".into());

    let outcome = runner.debug_single_step(step, None, vec![]).await.unwrap();
    assert!(outcome.result.success);
    assert_eq!(
        outcome.result.response.as_ref().unwrap().status_code,
        Some(200)
    );
    assert!(dal.reports().list_by_case(7).await.unwrap().is_empty());
}

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

//! Engine-level scenarios: extraction and assertion over HTTP responses,
//! environment URL composition, branch skipping, scripted steps, loop
//! semantics and ordering guarantees.

use serde_json::json;

use caseflow::engine::ExecutionEngine;
use caseflow::models::case::CaseSummary;
use caseflow::models::{
    AssertRule, ExtractRule, LoopErrorStrategy, LoopMode, ReportType, RequestArgsType, StepType,
    VariableItem,
};

use crate::fixtures::{
    bare_step, fresh_dal, json_response, seed_environment, seed_project, FixtureHttpClient,
};

fn summary() -> CaseSummary {
    CaseSummary {
        case_id: 1,
        case_code: "case-code".to_string(),
        case_name: "engine scenarios".to_string(),
    }
}

#[tokio::test]
async fn test_http_get_with_json_extract_and_numeric_assertion() {
    let dal = fresh_dal();
    let client = FixtureHttpClient::returning_json(200, &json!({"id": 1, "name": "A"}));
    let engine = ExecutionEngine::new(false).with_http_client(client.clone());

    let mut step = bare_step(1, 1, "get user", StepType::Http);
    step.request_url = Some("https://api.example/users/1".into());
    step.request_method = Some("GET".into());
    step.extract_variables = vec![ExtractRule {
        name: "uid".into(),
        source: "response json".into(),
        range: Some("SOME".into()),
        expr: Some("$.id".into()),
        index: None,
    }];
    step.assert_validators = vec![AssertRule {
        name: Some("ok".into()),
        expr: "$.id".into(),
        source: "response json".into(),
        operation: "等于".into(),
        except_value: json!(1),
    }];

    let run = engine
        .execute_case(&dal, &summary(), &[step], ReportType::DebugExec, None, vec![])
        .await
        .unwrap();

    let result = &run.results[0];
    assert!(result.success, "step failed: {:?}", result.error);
    assert_eq!(result.extract_variables[0].extract_value, Some(json!(1)));
    assert!(result.assert_validators[0].success);
    let uid = run
        .session_variables
        .iter()
        .find(|item| item.key == "uid")
        .expect("uid merged into the session pool");
    assert_eq!(uid.value, json!(1));
}

#[tokio::test]
async fn test_environment_base_url_composition() {
    let dal = fresh_dal();
    let project = seed_project(&dal).await;
    seed_environment(&dal, &project, "prod", "https://api.test/", 443).await;
    let client = FixtureHttpClient::returning_json(200, &json!({"ok": true}));
    let engine = ExecutionEngine::new(false).with_http_client(client.clone());

    let mut step = bare_step(1, 1, "login", StepType::Http);
    step.request_url = Some("v1/login".into());
    step.request_method = Some("POST".into());
    step.request_project_id = Some(project.id);
    step.request_args_type = Some(RequestArgsType::Json);
    step.request_body = Some(json!({"u": "x"}));

    let run = engine
        .execute_case(
            &dal,
            &summary(),
            &[step],
            ReportType::DebugExec,
            Some("prod".into()),
            vec![],
        )
        .await
        .unwrap();

    assert!(run.results[0].success);
    assert_eq!(client.seen_urls(), vec!["https://api.test:443/v1/login"]);
    let request = &client.requests.lock()[0];
    assert!(matches!(
        &request.body,
        caseflow::engine::http::HttpBody::Json(body) if body == &json!({"u": "x"})
    ));
}

#[tokio::test]
async fn test_missing_environment_fails_the_step() {
    let dal = fresh_dal();
    let client = FixtureHttpClient::returning_json(200, &json!({}));
    let engine = ExecutionEngine::new(false).with_http_client(client);

    let mut step = bare_step(1, 1, "relative", StepType::Http);
    step.request_url = Some("v1/ping".into());
    step.request_method = Some("GET".into());
    step.request_project_id = Some(99);

    let run = engine
        .execute_case(
            &dal,
            &summary(),
            &[step],
            ReportType::DebugExec,
            Some("prod".into()),
            vec![],
        )
        .await
        .unwrap();
    let result = &run.results[0];
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("not configured"));
}

#[tokio::test]
async fn test_if_branch_skipped_when_condition_not_met() {
    let dal = fresh_dal();
    let client = FixtureHttpClient::returning_json(200, &json!({}));
    let engine = ExecutionEngine::new(false).with_http_client(client.clone());

    let mut branch = bare_step(1, 1, "gate", StepType::If);
    branch.conditions = Some(
        json!({"value": "${flag}", "operation": "等于", "except_value": 1, "desc": "flag gate"})
            .to_string(),
    );
    let mut child = bare_step(1, 2, "guarded call", StepType::Http);
    child.request_url = Some("https://api.example/guarded".into());
    child.request_method = Some("GET".into());
    child.parent_step_id = Some(1);
    branch.children = vec![child];

    let run = engine
        .execute_case(
            &dal,
            &summary(),
            &[branch],
            ReportType::DebugExec,
            None,
            vec![VariableItem::new("flag", json!(0))],
        )
        .await
        .unwrap();

    let result = &run.results[0];
    assert!(result.success);
    assert!(result.message.contains("condition not met"));
    assert!(result.children.is_empty());
    assert!(client.requests.lock().is_empty(), "child must not run");
}

#[tokio::test]
async fn test_script_step_returning_map() {
    let dal = fresh_dal();
    let client = FixtureHttpClient::returning_json(200, &json!({}));
    let engine = ExecutionEngine::new(false).with_http_client(client);

    let mut step = bare_step(1, 1, "make token", StepType::Python);
    step.code = Some("def f():\n    return {\"token\": \"abc123\", \"n\": 7}".into());

    let run = engine
        .execute_case(&dal, &summary(), &[step], ReportType::DebugExec, None, vec![])
        .await
        .unwrap();

    let result = &run.results[0];
    assert!(result.success, "step failed: {:?}", result.error);
    let extracted: Vec<(&str, &serde_json::Value)> = result
        .extract_variables
        .iter()
        .map(|e| (e.name.as_str(), e.extract_value.as_ref().unwrap()))
        .collect();
    assert!(extracted.contains(&("token", &json!("abc123"))));
    assert!(extracted.contains(&("n", &json!(7))));
    for key in ["token", "n"] {
        assert!(run.session_variables.iter().any(|item| item.key == key));
    }
    // The synthetic response echo carries the result for audit parity.
    let echo = result.response.as_ref().unwrap();
    let body: serde_json::Value = serde_json::from_str(echo.text.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({"token": "abc123", "n": 7}));
}

#[tokio::test]
async fn test_root_steps_run_in_step_no_order() {
    let dal = fresh_dal();
    let client = FixtureHttpClient::returning_json(200, &json!({}));
    let engine = ExecutionEngine::new(false).with_http_client(client);

    let mut third = bare_step(1, 3, "third", StepType::Python);
    third.code = Some("result = {\"third\": 3}".into());
    let mut first = bare_step(1, 1, "first", StepType::Python);
    first.code = Some("result = {\"first\": 1}".into());
    let mut second = bare_step(1, 2, "second", StepType::Python);
    second.code = Some("result = {\"second\": 2}".into());

    let run = engine
        .execute_case(
            &dal,
            &summary(),
            &[third, first, second],
            ReportType::DebugExec,
            None,
            vec![],
        )
        .await
        .unwrap();
    let order: Vec<i64> = run.results.iter().map(|r| r.step_no).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_count_loop_cap_stops_runaway_configs() {
    let dal = fresh_dal();
    let client = FixtureHttpClient::returning_json(200, &json!({}));
    let engine = ExecutionEngine::new(false).with_http_client(client);

    let mut looped = bare_step(1, 1, "runaway", StepType::Loop);
    looped.loop_mode = Some(LoopMode::Count);
    looped.loop_maximums = Some(500);
    looped.loop_on_error = Some(LoopErrorStrategy::Continue);
    let mut child = bare_step(1, 2, "noop", StepType::Python);
    child.code = Some("result = {\"tick\": 1}".into());
    child.parent_step_id = Some(1);
    looped.children = vec![child];

    let run = engine
        .execute_case(&dal, &summary(), &[looped], ReportType::DebugExec, None, vec![])
        .await
        .unwrap();
    let result = &run.results[0];
    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("suspected infinite loop"));
    assert_eq!(result.children.len(), 100);
}

#[tokio::test]
async fn test_iterable_loop_binds_indexed_variables() {
    let dal = fresh_dal();
    let client = FixtureHttpClient::returning_json(200, &json!({}));
    let engine = ExecutionEngine::new(false).with_http_client(client);

    let mut looped = bare_step(1, 1, "over items", StepType::Loop);
    looped.loop_mode = Some(LoopMode::Iterable);
    looped.loop_on_error = Some(LoopErrorStrategy::Continue);
    looped.loop_iterable = Some("[\"a\", \"b\"]".into());
    looped.loop_iter_idx = Some("idx".into());
    looped.loop_iter_val = Some("item".into());
    let mut child = bare_step(1, 2, "peek", StepType::Python);
    child.code = Some("result = {\"seen\": 1}".into());
    child.parent_step_id = Some(1);
    looped.children = vec![child];

    let run = engine
        .execute_case(&dal, &summary(), &[looped], ReportType::DebugExec, None, vec![])
        .await
        .unwrap();
    assert!(run.results[0].success);
    assert_eq!(run.results[0].children.len(), 2);
    let find = |key: &str| {
        run.session_variables
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.clone())
    };
    assert_eq!(find("idx_1"), Some(json!(1)));
    assert_eq!(find("item_1"), Some(json!("a")));
    assert_eq!(find("idx_2"), Some(json!(2)));
    assert_eq!(find("item_2"), Some(json!("b")));
}

#[tokio::test]
async fn test_loop_stop_strategy_aborts_remaining_iterations() {
    let dal = fresh_dal();
    // Every response fails the child's assertion.
    let client = FixtureHttpClient::returning_json(200, &json!({"code": 500}));
    let engine = ExecutionEngine::new(false).with_http_client(client.clone());

    let mut looped = bare_step(1, 1, "strict", StepType::Loop);
    looped.loop_mode = Some(LoopMode::Count);
    looped.loop_maximums = Some(3);
    looped.loop_on_error = Some(LoopErrorStrategy::Stop);
    let mut child = bare_step(1, 2, "probe", StepType::Http);
    child.request_url = Some("https://api.example/probe".into());
    child.request_method = Some("GET".into());
    child.parent_step_id = Some(1);
    child.assert_validators = vec![AssertRule {
        name: Some("code".into()),
        expr: "$.code".into(),
        source: "response json".into(),
        operation: "等于".into(),
        except_value: json!(200),
    }];
    looped.children = vec![child];

    let run = engine
        .execute_case(&dal, &summary(), &[looped], ReportType::DebugExec, None, vec![])
        .await
        .unwrap();
    let result = &run.results[0];
    assert!(!result.success);
    // STOP aborted after the first failing iteration.
    assert_eq!(result.children.len(), 1);
    assert_eq!(client.requests.lock().len(), 1);
}

#[tokio::test]
async fn test_user_variables_step_feeds_later_steps() {
    let dal = fresh_dal();
    let client = FixtureHttpClient::returning_json(200, &json!({"ok": true}));
    let engine = ExecutionEngine::new(false).with_http_client(client.clone());

    let mut vars = bare_step(1, 1, "bind", StepType::UserVariables);
    vars.session_variables = vec![VariableItem::new("user_id", json!(42))];
    let mut call = bare_step(1, 2, "call", StepType::Http);
    call.request_url = Some("https://api.example/users/${user_id}".into());
    call.request_method = Some("GET".into());

    let run = engine
        .execute_case(
            &dal,
            &summary(),
            &[vars, call],
            ReportType::DebugExec,
            None,
            vec![],
        )
        .await
        .unwrap();
    assert!(run.results.iter().all(|r| r.success));
    assert_eq!(client.seen_urls(), vec!["https://api.example/users/42"]);
}

#[tokio::test]
async fn test_non_json_body_fails_only_json_extractions() {
    let dal = fresh_dal();
    let mut response = json_response(200, &json!({}));
    response.text = "plain text body: order=77".to_string();
    let client = FixtureHttpClient::with_queue(vec![response]);
    let engine = ExecutionEngine::new(false).with_http_client(client);

    let mut step = bare_step(1, 1, "mixed extract", StepType::Http);
    step.request_url = Some("https://api.example/report".into());
    step.request_method = Some("GET".into());
    step.extract_variables = vec![
        ExtractRule {
            name: "from_json".into(),
            source: "response json".into(),
            range: Some("SOME".into()),
            expr: Some("$.id".into()),
            index: None,
        },
        ExtractRule {
            name: "from_text".into(),
            source: "response text".into(),
            range: Some("SOME".into()),
            expr: Some(r"order=\d+".into()),
            index: None,
        },
    ];

    let run = engine
        .execute_case(&dal, &summary(), &[step], ReportType::DebugExec, None, vec![])
        .await
        .unwrap();
    let result = &run.results[0];
    // Per-entry failure: the JSON extraction fails, the step continues.
    assert!(result.success);
    assert!(!result.extract_variables[0].success);
    assert!(result.extract_variables[1].success);
    assert_eq!(
        result.extract_variables[1].extract_value,
        Some(json!("order=77"))
    );
}

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

//! HTTP step: compose the request, send it, echo the response, run the
//! extract and assert pipelines.
//!
//! A relative `request_url` is completed from the environment configured
//! for `(request_project_id, env_name)`; a missing environment fails the
//! step. A non-2xx status is not a failure by itself — assertions decide.
//! A body that does not parse as JSON is tolerated: extractions against
//! the JSON source then fail per-entry.

use serde_json::Value;

use super::{AssertOutcome, ExtractOutcome, ResponseEcho, StepOutcome};
use crate::engine::context::ExecutionContext;
use crate::engine::extract::{extract_from_source, ExtractSources};
use crate::engine::http::{HttpBody, HttpRequest};
use crate::engine::compare;
use crate::error::StepError;
use crate::models::variable::list_to_string_map;
use crate::models::{RequestArgsType, Step};

pub(super) async fn execute(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
) -> Result<(), StepError> {
    let url = resolve_url(step, ctx).await?;
    let method = step
        .request_method
        .as_deref()
        .unwrap_or_default()
        .to_uppercase();

    // Resolve placeholders in every configured list field, then flatten
    // to the string maps the transport consumes.
    let headers = list_to_string_map(&ctx.resolve_variable_items(&step.request_header));
    let params = list_to_string_map(&ctx.resolve_variable_items(&step.request_params));
    let form_data = list_to_string_map(&ctx.resolve_variable_items(&step.request_form_data));
    let urlencoded =
        list_to_string_map(&ctx.resolve_variable_items(&step.request_form_urlencoded));
    let form_files = list_to_string_map(&ctx.resolve_variable_items(&step.request_form_file));
    let body_json = step
        .request_body
        .as_ref()
        .map(|body| ctx.resolve_placeholders(body));
    let body_text = step
        .request_text
        .as_ref()
        .map(|text| ctx.resolve_string(text));

    let body = select_body(
        step.request_args_type,
        body_text,
        body_json,
        form_data,
        urlencoded,
        form_files,
    );

    let response = ctx
        .send_http_request(HttpRequest {
            method,
            url,
            headers,
            params,
            body,
            timeout: None,
        })
        .await?;

    outcome.response = Some(ResponseEcho {
        status_code: Some(response.status_code),
        headers: response.headers.clone(),
        text: Some(response.text.clone()),
        cookies: Some(response.cookies.clone()),
        elapsed: Some(format!("{:.6}", response.elapsed)),
    });

    // Best-effort body parse; a non-JSON body only affects extractions
    // that name the JSON source.
    let response_json: Option<Value> = serde_json::from_str(&response.text).ok();
    let sources = ExtractSources {
        response_json: response_json.as_ref(),
        response_text: Some(&response.text),
        response_headers: Some(&response.headers),
        response_cookies: Some(&response.cookies),
    };

    outcome.extract_variables = run_extractions(step, ctx, &sources);
    outcome.assert_validators = run_assertions(step, ctx, &sources);

    let mut failed_assertions = 0usize;
    for validator in &outcome.assert_validators {
        let line = format!(
            "assertion [{}]: actual [{:?}], operator [{}], expected [{}]",
            validator.name.as_deref().unwrap_or(&validator.expr),
            validator.actual_value,
            validator.operation,
            validator.except_value
        );
        if validator.success {
            ctx.log(format!("{line} — passed"));
        } else {
            ctx.log(format!("{line} — failed"));
            failed_assertions += 1;
        }
    }
    if failed_assertions > 0 {
        return Err(StepError::assertion(format!(
            "{failed_assertions} assertion(s) did not pass"
        )));
    }
    Ok(())
}

/// Completes a relative URL from the step's environment and validates the
/// final shape.
async fn resolve_url(step: &Step, ctx: &mut ExecutionContext) -> Result<String, StepError> {
    let mut url = step
        .request_url
        .as_deref()
        .map(|u| ctx.resolve_string(u))
        .unwrap_or_default();
    if url.trim().is_empty() {
        return Err(StepError::parameter(
            "http step is missing its required [request_url]",
        ));
    }
    if let Some(env_name) = ctx.env_name.clone() {
        if !url.to_lowercase().starts_with("http") {
            let project_id = step.request_project_id.unwrap_or_default();
            let environment = ctx
                .dal
                .environments()
                .get_by_project_and_name(project_id, &env_name)
                .await
                .map_err(|e| {
                    StepError::unknown(format!("environment lookup failed unexpectedly: {e}"))
                })?
                .ok_or_else(|| {
                    StepError::parameter(format!(
                        "environment (project_id={project_id}, env_name={env_name}) is not configured"
                    ))
                })?;
            let host = environment
                .env_host
                .trim()
                .trim_end_matches('/')
                .trim_end_matches(':');
            if host.is_empty() {
                return Err(StepError::parameter(format!(
                    "environment (project_id={project_id}, env_name={env_name}) has an empty host"
                )));
            }
            url = format!(
                "{host}:{}/{}",
                environment.env_port,
                url.trim_start_matches('/')
            );
        }
    }
    if !url.to_lowercase().starts_with("http") {
        return Err(StepError::parameter(format!(
            "request url ({url}) is not a valid HTTP/HTTPS address"
        )));
    }
    Ok(url)
}

/// Picks the request body per `request_args_type`; without a configured
/// type the compatibility order is raw → form/files → urlencoded → json.
fn select_body(
    args_type: Option<RequestArgsType>,
    body_text: Option<String>,
    body_json: Option<Value>,
    form_data: std::collections::BTreeMap<String, String>,
    urlencoded: std::collections::BTreeMap<String, String>,
    form_files: std::collections::BTreeMap<String, String>,
) -> HttpBody {
    match args_type {
        Some(RequestArgsType::None) | Some(RequestArgsType::Params) => HttpBody::Empty,
        Some(RequestArgsType::Raw) => body_text.map(HttpBody::Raw).unwrap_or_default(),
        Some(RequestArgsType::Json) => body_json.map(HttpBody::Json).unwrap_or_default(),
        Some(RequestArgsType::FormData) => HttpBody::Multipart {
            fields: form_data,
            files: form_files,
        },
        Some(RequestArgsType::XWwwFormUrlencoded) => HttpBody::Form(urlencoded),
        None => {
            if let Some(text) = body_text.filter(|t| !t.is_empty()) {
                HttpBody::Raw(text)
            } else if !form_data.is_empty() || !form_files.is_empty() {
                HttpBody::Multipart {
                    fields: form_data,
                    files: form_files,
                }
            } else if !urlencoded.is_empty() {
                HttpBody::Form(urlencoded)
            } else if let Some(json) = body_json {
                HttpBody::Json(json)
            } else {
                HttpBody::Empty
            }
        }
    }
}

/// The extract pipeline: per-entry failures are recorded on the entry and
/// never fail the step.
fn run_extractions(
    step: &Step,
    ctx: &mut ExecutionContext,
    sources: &ExtractSources<'_>,
) -> Vec<ExtractOutcome> {
    let mut results = Vec::new();
    for rule in &step.extract_variables {
        if rule.name.is_empty() || rule.source.is_empty() {
            ctx.log(
                "extraction rule skipped: [name] and [source] are required \
                 (add [range, expr, index] to refine the extraction)",
            );
            continue;
        }
        let extracted = {
            let lookup = |name: &str| ctx.get_variable(name).ok();
            extract_from_source(
                &rule.source,
                rule.expr.as_deref(),
                rule.range.as_deref(),
                rule.index,
                sources,
                &lookup,
                "extract",
            )
        };
        match extracted {
            Ok(value) => {
                ctx.log(format!(
                    "extraction [{}]: from [{}] succeeded, value: {value}",
                    rule.name, rule.source
                ));
                results.push(ExtractOutcome {
                    name: rule.name.clone(),
                    source: rule.source.clone(),
                    range: rule.range.clone(),
                    expr: rule.expr.clone(),
                    index: rule.index,
                    extract_value: Some(value),
                    success: true,
                    error: None,
                });
            }
            Err(err) => {
                ctx.log(format!(
                    "extraction [{}]: from [{}] failed: {err}",
                    rule.name, rule.source
                ));
                results.push(ExtractOutcome {
                    name: rule.name.clone(),
                    source: rule.source.clone(),
                    range: rule.range.clone(),
                    expr: rule.expr.clone(),
                    index: rule.index,
                    extract_value: None,
                    success: false,
                    error: Some(err.to_string()),
                });
            }
        }
    }
    results
}

/// The assert pipeline: always extracts with `range = SOME`, then runs
/// the operator table. Extraction or comparison failures mark the entry
/// failed; the caller turns any failed entry into a step failure.
fn run_assertions(
    step: &Step,
    ctx: &mut ExecutionContext,
    sources: &ExtractSources<'_>,
) -> Vec<AssertOutcome> {
    let mut results = Vec::new();
    for rule in &step.assert_validators {
        if rule.expr.is_empty() || rule.operation.is_empty() {
            ctx.log("assertion rule skipped: [expr] and [operation] are required");
            continue;
        }
        let actual = {
            let lookup = |name: &str| ctx.get_variable(name).ok();
            extract_from_source(
                &rule.source,
                Some(&rule.expr),
                Some("SOME"),
                None,
                sources,
                &lookup,
                "assert",
            )
        };
        let (actual_value, success, error) = match actual {
            Ok(value) => match compare::compare(&value, &rule.operation, &rule.except_value) {
                Ok(true) => (Some(value), true, String::new()),
                Ok(false) => (Some(value), false, "assertion failed".to_string()),
                Err(err) => (Some(value), false, err.to_string()),
            },
            Err(err) => (None, false, format!("failed to read the actual value: {err}")),
        };
        results.push(AssertOutcome {
            name: rule.name.clone(),
            expr: rule.expr.clone(),
            source: rule.source.clone(),
            operation: rule.operation.clone(),
            except_value: rule.except_value.clone(),
            actual_value,
            success,
            error,
        });
    }
    results
}

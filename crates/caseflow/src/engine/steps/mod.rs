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

//! Step executors.
//!
//! [`execute`] is the uniform wrapper around every step type: it stamps
//! timing and cycle bookkeeping, injects the step's `defined_variables`,
//! dispatches on the step type, folds extraction results back into the
//! session pool, and records the detail row. A failing body marks the
//! outcome failed and the wrapper keeps going — persistence problems
//! never mask an execution result.
//!
//! The per-type bodies live in the submodules; TCP and DATABASE rows
//! carry no engine behavior of their own and fall through to the default
//! body (children only), as does any future unknown type.

mod branch;
mod http;
mod looping;
mod quote;
mod script_step;
mod variables;
mod wait;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::engine::context::{ExecutionContext, Scope};
use crate::error::StepError;
use crate::models::{NewDetail, Step, StepType, VariableItem};

/// Result record of one extraction rule.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractOutcome {
    pub name: String,
    pub source: String,
    pub range: Option<String>,
    pub expr: Option<String>,
    pub index: Option<i64>,
    pub extract_value: Option<Value>,
    pub success: bool,
    pub error: Option<String>,
}

/// Result record of one assertion rule.
#[derive(Debug, Clone, Serialize)]
pub struct AssertOutcome {
    pub name: Option<String>,
    pub expr: String,
    pub source: String,
    pub operation: String,
    pub except_value: Value,
    pub actual_value: Option<Value>,
    pub success: bool,
    pub error: String,
}

/// Structured echo of a step's response (HTTP, or the synthetic echo a
/// scripted step writes for audit parity).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseEcho {
    pub status_code: Option<u16>,
    pub headers: BTreeMap<String, String>,
    pub text: Option<String>,
    pub cookies: Option<BTreeMap<String, String>>,
    pub elapsed: Option<String>,
}

/// Execution result of one step, children nested.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub case_id: i64,
    pub step_id: i64,
    pub step_no: i64,
    pub step_code: String,
    pub step_name: String,
    pub step_type: StepType,
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub response: Option<ResponseEcho>,
    /// Seconds, six decimals.
    pub elapsed: Option<f64>,
    pub quote_case_id: Option<i64>,
    pub extract_variables: Vec<ExtractOutcome>,
    pub assert_validators: Vec<AssertOutcome>,
    pub children: Vec<StepOutcome>,
}

impl StepOutcome {
    fn for_step(step: &Step) -> Self {
        StepOutcome {
            case_id: step.case_id,
            step_id: step.step_id,
            step_no: step.step_no,
            step_code: step.step_code.clone(),
            step_name: step.step_name.clone(),
            step_type: step.step_type,
            success: true,
            message: String::new(),
            error: None,
            response: None,
            elapsed: None,
            quote_case_id: step.quote_case_id,
            extract_variables: Vec::new(),
            assert_validators: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Boxed recursion point for child execution.
pub(crate) fn execute_boxed<'a>(
    step: &'a Step,
    ctx: &'a mut ExecutionContext,
) -> Pin<Box<dyn Future<Output = StepOutcome> + Send + 'a>> {
    Box::pin(execute(step, ctx))
}

/// Runs one step to a [`StepOutcome`]. Never fails — body errors are
/// recorded on the outcome.
pub async fn execute(step: &Step, ctx: &mut ExecutionContext) -> StepOutcome {
    let started = Instant::now();
    let step_start = Local::now().naive_local();
    let num_cycles = ctx.step_cycle_index.get(&step.step_code).copied();

    let mut outcome = StepOutcome::for_step(step);
    let previous_step_code = ctx.current_step_code().map(str::to_string);
    ctx.set_current_step_code(Some(step.step_code.clone()));
    ctx.defined_variables = step.defined_variables.clone();

    if let Err(err) = dispatch(step, ctx, &mut outcome).await {
        outcome.success = false;
        outcome.error = Some(err.message.clone());
        ctx.log(&err.message);
    }

    // Fold extraction results into the session pool so later steps can
    // reference them.
    let merged: Vec<VariableItem> = outcome
        .extract_variables
        .iter()
        .filter(|entry| !entry.name.is_empty())
        .map(|entry| VariableItem::new(
            entry.name.clone(),
            entry.extract_value.clone().unwrap_or(Value::Null),
        ))
        .collect();
    if !merged.is_empty() {
        ctx.update_variables(merged, Scope::Session);
    }

    ctx.set_current_step_code(previous_step_code);
    outcome.elapsed = Some((started.elapsed().as_secs_f64() * 1e6).round() / 1e6);

    if ctx.report_code.is_some() {
        let detail = build_detail(step, ctx, &outcome, step_start, num_cycles);
        if let Err(err) = ctx.save_detail(detail).await {
            ctx.log_for(
                Some(&step.step_code),
                format!(
                    "failed to save the step detail (case_id={}, step_id={}, step_no={}): {err}",
                    step.case_id, step.step_id, step.step_no
                ),
            );
        }
    }
    debug!(
        step_code = %step.step_code,
        step_type = ?step.step_type,
        success = outcome.success,
        "step finished"
    );
    outcome
}

async fn dispatch(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
) -> Result<(), StepError> {
    match step.step_type {
        StepType::Http => http::execute(step, ctx, outcome).await,
        StepType::Python => script_step::execute(step, ctx, outcome).await,
        StepType::Wait => wait::execute(step, ctx).await,
        StepType::UserVariables => variables::execute(step, ctx).await,
        StepType::If => branch::execute(step, ctx, outcome).await,
        StepType::Loop => looping::execute(step, ctx, outcome).await,
        StepType::Quote => quote::execute(step, ctx, outcome).await,
        StepType::Tcp | StepType::Database => execute_default(step, ctx, outcome).await,
    }
}

/// Default body: run children in order, no behavior of its own.
async fn execute_default(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
) -> Result<(), StepError> {
    for child in execute_children(step, ctx).await {
        if !child.success {
            outcome.success = false;
        }
        outcome.children.push(child);
    }
    Ok(())
}

/// Executes children and inlined quote steps in `step_no` order.
pub(crate) async fn execute_children(step: &Step, ctx: &mut ExecutionContext) -> Vec<StepOutcome> {
    let mut results = Vec::new();
    for child in step.ordered_children() {
        results.push(execute_boxed(child, ctx).await);
    }
    results
}

fn build_detail(
    step: &Step,
    ctx: &ExecutionContext,
    outcome: &StepOutcome,
    step_start: chrono::NaiveDateTime,
    num_cycles: Option<u32>,
) -> NewDetail {
    let step_end = Local::now().naive_local();
    let step_logs = ctx
        .logs
        .get(&step.step_code)
        .filter(|lines| !lines.is_empty())
        .map(|lines| lines.join("\n"));

    let (response_header, response_body, response_text, response_cookie, response_elapsed) =
        match &outcome.response {
            Some(echo) => {
                let body = echo
                    .text
                    .as_deref()
                    .and_then(|text| serde_json::from_str::<Value>(text).ok());
                let cookie = echo
                    .cookies
                    .as_ref()
                    .filter(|cookies| !cookies.is_empty())
                    .and_then(|cookies| serde_json::to_string(cookies).ok());
                let header = (!echo.headers.is_empty())
                    .then(|| serde_json::to_value(&echo.headers).ok())
                    .flatten();
                (header, body, echo.text.clone(), cookie, echo.elapsed.clone())
            }
            None => (None, None, None, None, None),
        };

    NewDetail {
        case_id: ctx.case_id,
        case_code: ctx.case_code.clone(),
        report_code: ctx.report_code.clone().unwrap_or_default(),
        quote_case_id: step.quote_case_id,
        step_id: step.step_id,
        step_no: step.step_no,
        step_name: step.step_name.clone(),
        step_code: step.step_code.clone(),
        step_type: step.step_type,
        step_state: outcome.success,
        step_st_time: Some(step_start.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        step_ed_time: Some(step_end.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        step_elapsed: Some(format!("{:.3}", outcome.elapsed.unwrap_or_default())),
        step_exec_logger: step_logs,
        step_exec_except: outcome.error.clone(),
        response_cookie,
        response_header,
        response_body,
        response_text,
        response_elapsed,
        session_variables: ctx.session_variables.clone(),
        defined_variables: step.defined_variables.clone(),
        extract_variables: serde_json::to_value(&outcome.extract_variables).ok(),
        assert_validators: serde_json::to_value(&outcome.assert_validators).ok(),
        num_cycles,
    }
}

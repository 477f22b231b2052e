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

//! Loop step: COUNT, ITERABLE, DICT and CONDITION modes.
//!
//! All modes honor `loop_interval` between iterations (never after the
//! last) and record the 1-based cycle index on the loop and on every
//! child, which is what keeps detail rows unique across iterations.
//! COUNT and CONDITION carry the hard iteration guard against suspected
//! infinite loops; CONDITION additionally honors an optional wall-clock
//! `loop_timeout`. A failing child applies the configured strategy:
//! CONTINUE notes it and moves on, BREAK ends the loop cleanly, STOP
//! propagates and aborts the whole case.

use std::time::Instant;

use serde_json::Value;

use super::branch::{evaluate_condition, parse_condition};
use super::{execute_children, StepOutcome};
use crate::engine::context::{ExecutionContext, Scope};
use crate::error::StepError;
use crate::models::{LoopErrorStrategy, LoopMode, Step, VariableItem};

pub(super) async fn execute(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
) -> Result<(), StepError> {
    let mode = step.loop_mode.ok_or_else(|| {
        StepError::parameter(
            "loop step must name its mode (one of: COUNT, ITERABLE, DICT, CONDITION)",
        )
    })?;
    let on_error = step.loop_on_error.ok_or_else(|| {
        StepError::parameter(
            "loop step must name its error strategy (one of: CONTINUE, BREAK, STOP)",
        )
    })?;
    match mode {
        LoopMode::Count => execute_count(step, ctx, outcome, on_error).await,
        LoopMode::Iterable => execute_iterable(step, ctx, outcome, on_error).await,
        LoopMode::Dict => execute_dict(step, ctx, outcome, on_error).await,
        LoopMode::Condition => execute_condition(step, ctx, outcome, on_error).await,
    }
}

/// What one round of children told the loop to do next.
enum LoopSignal {
    Proceed,
    Break,
}

/// Runs one iteration's children, applying the error strategy.
async fn run_children(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
    on_error: LoopErrorStrategy,
) -> Result<LoopSignal, StepError> {
    for child in execute_children(step, ctx).await {
        let failed = !child.success;
        let child_error = child.error.clone().unwrap_or_default();
        outcome.children.push(child);
        if !failed {
            continue;
        }
        outcome.success = false;
        match on_error {
            LoopErrorStrategy::Stop => {
                return Err(StepError::unknown(format!(
                    "loop child failed (strategy: stop the whole case): {child_error}"
                )));
            }
            LoopErrorStrategy::Break => {
                ctx.log_for(
                    Some(&step.step_code),
                    format!("loop child failed (strategy: break the loop): {child_error}"),
                );
                return Ok(LoopSignal::Break);
            }
            LoopErrorStrategy::Continue => {
                ctx.log_for(
                    Some(&step.step_code),
                    format!("loop child failed (strategy: continue): {child_error}"),
                );
            }
        }
    }
    Ok(LoopSignal::Proceed)
}

fn mark_cycle(step: &Step, ctx: &mut ExecutionContext, iteration: u32) {
    ctx.step_cycle_index
        .insert(step.step_code.clone(), iteration);
    for child in step.ordered_children() {
        ctx.step_cycle_index
            .insert(child.step_code.clone(), iteration);
    }
}

async fn pause_between(step: &Step, ctx: &mut ExecutionContext) -> Result<(), StepError> {
    if let Some(interval) = step.loop_interval.filter(|i| *i > 0.0) {
        ctx.sleep(interval).await?;
    }
    Ok(())
}

async fn execute_count(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
    on_error: LoopErrorStrategy,
) -> Result<(), StepError> {
    let maximums = step
        .loop_maximums
        .filter(|m| *m > 0)
        .ok_or_else(|| StepError::parameter("COUNT loop requires a positive [loop_maximums]"))?;
    let guard_limit = ctx.config.loop_guard_limit;

    ctx.log(format!("count loop started: {maximums} iterations"));
    for iteration in 1..=maximums {
        mark_cycle(step, ctx, iteration);
        ctx.log_for(
            Some(&step.step_code),
            format!("count loop: iteration {iteration}/{maximums}"),
        );
        match run_children(step, ctx, outcome, on_error).await? {
            LoopSignal::Break => return Ok(()),
            LoopSignal::Proceed => {}
        }
        if iteration < maximums {
            pause_between(step, ctx).await?;
        }
        if iteration >= guard_limit {
            return Err(StepError::parameter(format!(
                "loop exceeded the {guard_limit}-iteration guard after {iteration} rounds; \
                 suspected infinite loop, terminated for safety"
            )));
        }
    }
    ctx.log_for(
        Some(&step.step_code),
        format!("count loop finished: {maximums} iterations"),
    );
    Ok(())
}

/// Resolves the loop data source: a `${var}` reference reads the pool,
/// an inline JSON string parses, anything already structured passes
/// through.
fn parse_iterable_source(step: &Step, ctx: &mut ExecutionContext) -> Result<Value, StepError> {
    let raw = step
        .loop_iterable
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| StepError::parameter("loop requires a non-empty [loop_iterable]"))?;
    let resolved = ctx.resolve_placeholders(&Value::String(raw.to_string()));
    match resolved {
        Value::String(s) => {
            if s.starts_with("${") && s.ends_with('}') {
                let name = s[2..s.len() - 1].to_string();
                return ctx.get_variable(&name);
            }
            Ok(serde_json::from_str(&s).unwrap_or(Value::String(s)))
        }
        other => Ok(other),
    }
}

fn index_variable_name(step: &Step) -> String {
    step.loop_iter_idx
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "loop_index".to_string())
}

fn value_variable_name(step: &Step) -> String {
    step.loop_iter_val
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "loop_value".to_string())
}

async fn execute_iterable(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
    on_error: LoopErrorStrategy,
) -> Result<(), StepError> {
    let source = parse_iterable_source(step, ctx)?;
    let items = match source {
        Value::Array(items) => items,
        Value::String(_) => {
            return Err(StepError::parameter(
                "ITERABLE loop requires a list source, got a plain string",
            ))
        }
        other => {
            return Err(StepError::parameter(format!(
                "ITERABLE loop requires a list source, got: {other}"
            )))
        }
    };
    if items.is_empty() {
        ctx.log("iterable loop: source is empty, skipped");
        return Ok(());
    }

    let index_name = index_variable_name(step);
    let value_name = value_variable_name(step);
    let total = items.len();
    ctx.log(format!(
        "iterable loop started: {total} items, index variable [{index_name}], value variable [{value_name}]"
    ));
    for (position, item) in items.into_iter().enumerate() {
        let idx = (position + 1) as u32;
        mark_cycle(step, ctx, idx);
        ctx.log_for(
            Some(&step.step_code),
            format!("iterable loop: iteration {idx}/{total}, item: {item}"),
        );
        ctx.update_variables(
            vec![
                VariableItem::new(format!("{index_name}_{idx}"), Value::from(idx)),
                VariableItem::new(format!("{value_name}_{idx}"), item),
            ],
            Scope::Session,
        );
        match run_children(step, ctx, outcome, on_error).await? {
            LoopSignal::Break => return Ok(()),
            LoopSignal::Proceed => {}
        }
        if (idx as usize) < total {
            pause_between(step, ctx).await?;
        }
    }
    ctx.log_for(
        Some(&step.step_code),
        format!("iterable loop finished: {total} iterations"),
    );
    Ok(())
}

async fn execute_dict(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
    on_error: LoopErrorStrategy,
) -> Result<(), StepError> {
    let source = parse_iterable_source(step, ctx)?;
    let entries = match source {
        Value::Object(map) => map,
        other => {
            return Err(StepError::parameter(format!(
                "DICT loop requires an object source, got: {other}"
            )))
        }
    };
    if entries.is_empty() {
        ctx.log("dict loop: source is empty, skipped");
        return Ok(());
    }

    let index_name = index_variable_name(step);
    let key_name = step
        .loop_iter_key
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "loop_key".to_string());
    let value_name = value_variable_name(step);
    let total = entries.len();
    ctx.log(format!(
        "dict loop started: {total} entries, index variable [{index_name}], \
         key variable [{key_name}], value variable [{value_name}]"
    ));
    for (position, (key, value)) in entries.into_iter().enumerate() {
        let idx = (position + 1) as u32;
        mark_cycle(step, ctx, idx);
        ctx.log_for(
            Some(&step.step_code),
            format!("dict loop: iteration {idx}/{total}, key={key}, value={value}"),
        );
        ctx.update_variables(
            vec![
                VariableItem::new(format!("{index_name}_{idx}"), Value::from(idx)),
                VariableItem::new(format!("{key_name}_{idx}"), Value::String(key)),
                VariableItem::new(format!("{value_name}_{idx}"), value),
            ],
            Scope::Session,
        );
        match run_children(step, ctx, outcome, on_error).await? {
            LoopSignal::Break => return Ok(()),
            LoopSignal::Proceed => {}
        }
        if (idx as usize) < total {
            pause_between(step, ctx).await?;
        }
    }
    ctx.log_for(
        Some(&step.step_code),
        format!("dict loop finished: {total} iterations"),
    );
    Ok(())
}

async fn execute_condition(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
    on_error: LoopErrorStrategy,
) -> Result<(), StepError> {
    let raw = step
        .conditions
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| StepError::parameter("CONDITION loop requires [conditions]"))?;
    let condition = parse_condition(raw)?;
    let guard_limit = ctx.config.loop_guard_limit;
    let timeout = step.loop_timeout.filter(|t| *t > 0.0);
    let started = Instant::now();
    let mut iteration = 0u32;

    ctx.log(format!(
        "condition loop started: timeout configured as {timeout:?} seconds"
    ));
    loop {
        iteration += 1;
        if let Some(limit) = timeout {
            let elapsed = started.elapsed().as_secs_f64();
            if elapsed >= limit {
                ctx.log_for(
                    Some(&step.step_code),
                    format!(
                        "condition loop timed out: {iteration} rounds in {elapsed:.2}s, \
                         over the {limit}s limit"
                    ),
                );
                break;
            }
        }
        mark_cycle(step, ctx, iteration);
        ctx.log_for(
            Some(&step.step_code),
            format!("condition loop: iteration {iteration}"),
        );
        match run_children(step, ctx, outcome, on_error).await? {
            LoopSignal::Break => break,
            LoopSignal::Proceed => {}
        }
        match evaluate_condition(&condition, ctx) {
            Ok(true) => {}
            Ok(false) => {
                ctx.log_for(
                    Some(&step.step_code),
                    "condition loop: condition no longer holds, finished",
                );
                break;
            }
            Err(err) => {
                outcome.success = false;
                outcome.error = Some(format!("condition evaluation failed: {err}"));
                let message = outcome.error.clone().unwrap_or_default();
                ctx.log_for(Some(&step.step_code), message);
                break;
            }
        }
        if iteration >= guard_limit {
            return Err(StepError::parameter(format!(
                "loop exceeded the {guard_limit}-iteration guard after {iteration} rounds; \
                 suspected infinite loop, terminated for safety"
            )));
        }
        pause_between(step, ctx).await?;
    }
    ctx.log_for(
        Some(&step.step_code),
        format!("condition loop finished: {iteration} iterations"),
    );
    Ok(())
}

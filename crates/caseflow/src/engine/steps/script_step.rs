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

//! Scripted-code step: runs the restricted evaluator over the step's
//! `code`. Every entry of the returned map becomes one extraction record
//! (merged into the session pool by the execute wrapper), and a synthetic
//! response echo is written for audit parity with HTTP steps.

use chrono::Local;
use serde_json::Value;

use super::{ExtractOutcome, ResponseEcho, StepOutcome};
use crate::engine::context::ExecutionContext;
use crate::error::StepError;
use crate::models::Step;

pub(super) async fn execute(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
) -> Result<(), StepError> {
    let code = step
        .code
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| StepError::parameter("scripted step is missing its required [code]"))?;

    let started = Local::now();
    let result = ctx.run_script_code(code)?;
    let elapsed = Local::now()
        .signed_duration_since(started)
        .num_milliseconds() as f64
        / 1000.0;

    if result.is_empty() {
        return Ok(());
    }

    outcome.extract_variables = result
        .iter()
        .map(|(name, value)| ExtractOutcome {
            name: name.clone(),
            source: "python".to_string(),
            range: Some("ALL".to_string()),
            expr: None,
            index: None,
            extract_value: Some(value.clone()),
            success: true,
            error: None,
        })
        .collect();
    outcome.response = Some(ResponseEcho {
        status_code: None,
        headers: Default::default(),
        text: serde_json::to_string(&Value::Object(result)).ok(),
        cookies: None,
        elapsed: Some(format!("{elapsed:.3}")),
    });
    Ok(())
}

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

//! Quote step: runs a public-script case's root steps inline, in the
//! current context, so variables flow through. The quoted case must be
//! flagged PUBLIC_SCRIPT — a private case behind the reference surfaces
//! as not found, enforcing the write-time invariant at read time.

use super::{execute_boxed, StepOutcome};
use crate::engine::context::ExecutionContext;
use crate::error::StepError;
use crate::models::Step;

pub(super) async fn execute(
    step: &Step,
    ctx: &mut ExecutionContext,
    outcome: &mut StepOutcome,
) -> Result<(), StepError> {
    let quote_case_id = step
        .quote_case_id
        .ok_or_else(|| StepError::parameter("quote step is missing its required [quote_case_id]"))?;

    let quoted_case = ctx
        .dal
        .cases()
        .get_public_script(quote_case_id)
        .await
        .map_err(|e| {
            StepError::parameter(format!(
                "quoted case (id={quote_case_id}) is not available: {e}"
            ))
        })?;
    let (quote_tree, _counter) = ctx
        .dal
        .steps()
        .tree_by_case(quote_case_id)
        .await
        .map_err(|e| {
            StepError::unknown(format!(
                "failed to load the quoted case (id={quote_case_id}) step tree: {e}"
            ))
        })?;

    if quote_tree.is_empty() {
        ctx.log(format!(
            "quoted case (id={quote_case_id}) has no executable steps"
        ));
        return Ok(());
    }

    ctx.log(format!(
        "quoted case (id={quote_case_id}, name={}) started",
        quoted_case.case_name
    ));
    let mut ordered = quote_tree;
    ordered.sort_by_key(|quoted| quoted.step_no);
    for quoted_step in &ordered {
        let child = execute_boxed(quoted_step, ctx).await;
        if !child.success {
            outcome.success = false;
        }
        outcome.children.push(child);
    }
    ctx.log_for(
        Some(&step.step_code),
        format!(
            "quoted case (id={quote_case_id}, name={}) finished",
            quoted_case.case_name
        ),
    );
    Ok(())
}

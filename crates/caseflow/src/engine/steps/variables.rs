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

//! User-variables step: resolves the step's configured bindings — the
//! single pass handles `${var}` references and `${func(...)}` generator
//! calls alike — and merges them into the session pool.

use crate::engine::context::{ExecutionContext, Scope};
use crate::error::StepError;
use crate::models::Step;

pub(super) async fn execute(step: &Step, ctx: &mut ExecutionContext) -> Result<(), StepError> {
    if step.session_variables.is_empty() {
        return Ok(());
    }
    // Resolve a copy; the configured step data stays untouched.
    let resolved = ctx.resolve_variable_items(&step.session_variables);
    let keys: Vec<&str> = resolved.iter().map(|item| item.key.as_str()).collect();
    ctx.log(format!("user variables merged into the session pool: {keys:?}"));
    ctx.update_variables(resolved, Scope::Session);
    Ok(())
}

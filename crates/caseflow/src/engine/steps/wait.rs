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

//! Wait step: a cooperative pause of `step.wait` seconds.

use crate::engine::context::ExecutionContext;
use crate::error::StepError;
use crate::models::Step;

pub(super) async fn execute(step: &Step, ctx: &mut ExecutionContext) -> Result<(), StepError> {
    let seconds = step
        .wait
        .ok_or_else(|| StepError::parameter("wait step is missing its required [wait] seconds"))?;
    ctx.sleep(seconds).await
}

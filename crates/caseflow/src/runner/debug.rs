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

//! Debug entry points.
//!
//! These reuse the engine request/response shapes for interactive use: a
//! full-tree debug run saved as DEBUG_EXEC, and single-step dry runs
//! (HTTP or scripted code) that persist nothing.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{CaseRunner, CaseRunSummary};
use crate::engine::steps::StepOutcome;
use crate::error::{Error, Result};
use crate::models::case::CaseSummary;
use crate::models::{ReportType, Step, VariableItem};

/// Outcome of a single-step dry run: the step result plus its transcript.
#[derive(Debug, Clone, Serialize)]
pub struct StepDebugOutcome {
    pub result: StepOutcome,
    pub logs: BTreeMap<String, Vec<String>>,
    pub session_variables: Vec<VariableItem>,
}

impl CaseRunner {
    /// Debugs caller-provided steps against a stored case: the tree is
    /// executed as given and the run is saved as DEBUG_EXEC.
    pub async fn debug_case(
        &self,
        case_id: i64,
        steps: Vec<Step>,
        env_name: Option<String>,
        initial_variables: Vec<VariableItem>,
    ) -> Result<CaseRunSummary> {
        let case = self.dal.cases().get_by_id(case_id).await?;
        let run = self
            .engine(true)
            .execute_case(
                &self.dal,
                &case.summary(),
                &steps,
                ReportType::DebugExec,
                env_name,
                initial_variables,
            )
            .await?;
        self.persist_run(case_id, &case.case_code, &case.case_name, run)
            .await
    }

    /// Dry-runs one step — no report, no details, nothing persisted.
    /// Backs the HTTP and scripted-code debugging surfaces.
    pub async fn debug_single_step(
        &self,
        step: Step,
        env_name: Option<String>,
        initial_variables: Vec<VariableItem>,
    ) -> Result<StepDebugOutcome> {
        let case = CaseSummary {
            case_id: step.case_id,
            case_code: format!("debug-{}", step.step_code),
            case_name: step.step_name.clone(),
        };
        let steps = vec![step];
        let mut run = self
            .engine(false)
            .execute_case(
                &self.dal,
                &case,
                &steps,
                ReportType::DebugExec,
                env_name,
                initial_variables,
            )
            .await?;
        let result = run
            .results
            .pop()
            .ok_or_else(|| Error::parameter("debug run produced no result"))?;
        Ok(StepDebugOutcome {
            result,
            logs: run.logs,
            session_variables: run.session_variables,
        })
    }
}

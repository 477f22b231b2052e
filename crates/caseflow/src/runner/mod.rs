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

//! Case runner.
//!
//! Loads a case and its materialized step tree, merges the variable
//! layers (case-level, step-collected, caller-provided — later wins),
//! runs the engine in deferred-save mode, and persists the report, the
//! details and the case-state update in one short transaction. A
//! persistence failure never loses the execution result: the summary
//! comes back with `saved_to_database = false`.
//!
//! The batch runner executes case ids sequentially under a shared
//! `batch_code`, one transaction per case.

pub mod debug;

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::dal::DAL;
use crate::engine::http::HttpClient;
use crate::engine::orchestrator::{EngineRun, ExecutionEngine};
use crate::error::{Error, Result};
use crate::models::variable::upsert_into;
use crate::models::{unique_identify, ReportType, Step, VariableItem};

/// Summary of one case run.
#[derive(Debug, Clone, Serialize)]
pub struct CaseRunSummary {
    pub success: bool,
    pub total_steps: u32,
    pub success_steps: u32,
    pub failed_steps: u32,
    pub pass_ratio: f64,
    pub report_code: Option<String>,
    pub saved_to_database: bool,
    pub case_id: i64,
    pub case_code: String,
    pub case_name: String,
    pub error: Option<String>,
}

/// Accumulated outcome of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRunSummary {
    pub total_cases: u32,
    pub success_cases: u32,
    pub failed_cases: u32,
    pub results: Vec<CaseRunSummary>,
    pub summary: BatchTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchTotals {
    /// `success_cases / total_cases` in `[0, 1]`.
    pub success_rate: f64,
    pub all_success: bool,
}

/// Runs cases against the repository, persisting reports and details.
#[derive(Clone)]
pub struct CaseRunner {
    dal: DAL,
    http_client: Option<Arc<dyn HttpClient>>,
    config: EngineConfig,
}

impl CaseRunner {
    pub fn new(dal: DAL) -> Self {
        CaseRunner {
            dal,
            http_client: None,
            config: EngineConfig::default(),
        }
    }

    /// Injects a transport for every engine run, e.g. a fixture client.
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    fn engine(&self, save_report: bool) -> ExecutionEngine {
        let mut engine = ExecutionEngine::new(save_report).with_config(self.config.clone());
        if let Some(client) = &self.http_client {
            engine = engine.with_http_client(Arc::clone(client));
        }
        engine
    }

    /// Executes one case end to end and persists the outcome.
    pub async fn execute_single_case(
        &self,
        case_id: i64,
        report_type: ReportType,
        initial_variables: Vec<VariableItem>,
        env_name: Option<String>,
        task_code: Option<String>,
        batch_code: Option<String>,
    ) -> Result<CaseRunSummary> {
        let case = self.dal.cases().get_by_id(case_id).await?;
        let (tree, counter) = self.dal.steps().tree_by_case(case_id).await?;
        if counter.total_steps == 0 || tree.is_empty() {
            return Err(Error::parameter(format!(
                "case (case_id={case_id}) has no executable root steps"
            )));
        }
        info!(
            case_id,
            total = counter.total_steps,
            quoted = counter.quote_steps,
            "loaded case step tree"
        );

        // Variable layering: case-level first, then everything collected
        // from the tree, then the caller's bindings — same key, later wins.
        let mut merged: Vec<VariableItem> = Vec::new();
        upsert_into(&mut merged, case.session_variables.clone());
        upsert_into(&mut merged, collect_session_variables(&tree));
        upsert_into(&mut merged, initial_variables);

        let engine = self
            .engine(true)
            .with_task_code(task_code)
            .with_batch_code(batch_code);
        let run = engine
            .execute_case(
                &self.dal,
                &case.summary(),
                &tree,
                report_type,
                env_name,
                merged,
            )
            .await?;

        self.persist_run(case_id, &case.case_code, &case.case_name, run).await
    }

    async fn persist_run(
        &self,
        case_id: i64,
        case_code: &str,
        case_name: &str,
        run: EngineRun,
    ) -> Result<CaseRunSummary> {
        // A saving run must come back with its report payload; anything
        // else is a bug worth surfacing, not silently returning nothing.
        let report = run.deferred_report.ok_or_else(|| {
            Error::parameter(
                "engine returned no report payload although saving was requested",
            )
        })?;
        let statistics = run.statistics;
        let case_state = statistics.failed_steps == 0;

        let saved = self
            .dal
            .persist_case_run(
                report,
                run.pending_details,
                case_state,
                Some(crate::dal::now()),
            )
            .await;
        let saved_to_database = match &saved {
            Ok(_) => true,
            Err(err) => {
                error!(case_id, %err, "failed to persist the case run");
                false
            }
        };

        Ok(CaseRunSummary {
            success: case_state,
            total_steps: statistics.total_steps,
            success_steps: statistics.success_steps,
            failed_steps: statistics.failed_steps,
            pass_ratio: statistics.pass_ratio,
            report_code: run.report_code,
            saved_to_database,
            case_id,
            case_code: case_code.to_string(),
            case_name: case_name.to_string(),
            error: None,
        })
    }

    /// Executes many cases sequentially, one persistence transaction per
    /// case, under a shared batch code.
    pub async fn batch_execute_cases(
        &self,
        case_ids: &[i64],
        report_type: ReportType,
        initial_variables: Vec<VariableItem>,
        env_name: Option<String>,
        task_code: Option<String>,
    ) -> Result<BatchRunSummary> {
        let total_cases = case_ids.len() as u32;
        let mut success_cases = 0u32;
        let mut failed_cases = 0u32;
        let mut results = Vec::new();
        let batch_code = unique_identify();

        info!(cases = ?case_ids, %batch_code, "batch execution started");
        for &case_id in case_ids {
            let run = self
                .execute_single_case(
                    case_id,
                    report_type,
                    initial_variables.clone(),
                    env_name.clone(),
                    task_code.clone(),
                    Some(batch_code.clone()),
                )
                .await;
            match run {
                Ok(summary) => {
                    if summary.success {
                        success_cases += 1;
                    } else {
                        failed_cases += 1;
                    }
                    results.push(summary);
                }
                Err(err) => {
                    let message = format!("case (case_id={case_id}) execution failed: {err}");
                    error!(case_id, %err, "batch case failed");
                    failed_cases += 1;
                    results.push(CaseRunSummary {
                        success: false,
                        total_steps: 0,
                        success_steps: 0,
                        failed_steps: 0,
                        pass_ratio: 0.0,
                        report_code: None,
                        saved_to_database: false,
                        case_id,
                        case_code: String::new(),
                        case_name: String::new(),
                        error: Some(message),
                    });
                }
            }
        }
        info!(%batch_code, success_cases, failed_cases, "batch execution finished");

        Ok(BatchRunSummary {
            total_cases,
            success_cases,
            failed_cases,
            results,
            summary: BatchTotals {
                success_rate: if total_cases > 0 {
                    f64::from(success_cases) / f64::from(total_cases)
                } else {
                    0.0
                },
                all_success: failed_cases == 0,
            },
        })
    }
}

/// Recursively collects the `session_variables` configured on every step
/// of a tree, children and quoted trees included.
pub fn collect_session_variables(steps: &[Step]) -> Vec<VariableItem> {
    let mut collected = Vec::new();
    for step in steps {
        collected.extend(step.session_variables.iter().cloned());
        collected.extend(collect_session_variables(&step.children));
        collected.extend(collect_session_variables(&step.quote_steps));
    }
    collected
}

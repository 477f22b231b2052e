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

//! Case-level execution engine.
//!
//! Runs a case's root steps in `step_no` order inside a fresh context,
//! aggregates descendant transcripts onto each root step, computes the
//! pass/fail statistics (deduplicated by step code — a loop body that
//! fails once marks its step code failed), and, when saving, emits the
//! deferred report payload plus the ordered detail payloads for the
//! caller to persist in one transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::config::EngineConfig;
use crate::dal::DAL;
use crate::engine::context::ExecutionContext;
use crate::engine::http::{HttpClient, ReqwestClient};
use crate::engine::steps::{self, StepOutcome};
use crate::error::{Error, Result};
use crate::models::case::CaseSummary;
use crate::models::{unique_identify, NewDetail, NewReport, ReportType, Step, VariableItem};

/// Aggregate statistics of one run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunStatistics {
    pub total_steps: u32,
    pub success_steps: u32,
    pub failed_steps: u32,
    /// Percentage in `[0, 100]`, two decimals.
    pub pass_ratio: f64,
}

/// Everything one engine invocation produces.
pub struct EngineRun {
    /// Root step outcomes, children nested.
    pub results: Vec<StepOutcome>,
    /// Step transcripts keyed by step code (descendants aggregated onto
    /// roots).
    pub logs: BTreeMap<String, Vec<String>>,
    /// Minted when saving, `None` for pure debugging.
    pub report_code: Option<String>,
    pub statistics: RunStatistics,
    /// The session pool as it stood when the run finished.
    pub session_variables: Vec<VariableItem>,
    /// Report payload for the caller to persist (saving runs only).
    pub deferred_report: Option<NewReport>,
    /// Detail payloads in execution order (saving runs only).
    pub pending_details: Vec<NewDetail>,
}

/// The execution engine, configured once per invocation.
pub struct ExecutionEngine {
    save_report: bool,
    task_code: Option<String>,
    batch_code: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(save_report: bool) -> Self {
        ExecutionEngine {
            save_report,
            task_code: None,
            batch_code: None,
            http_client: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_task_code(mut self, task_code: Option<String>) -> Self {
        self.task_code = task_code;
        self
    }

    pub fn with_batch_code(mut self, batch_code: Option<String>) -> Self {
        self.batch_code = batch_code;
        self
    }

    /// Injects a transport, e.g. a fixture client in tests. Without one
    /// the engine builds its own client per run.
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Executes one case: root steps sorted by `step_no`, each followed by
    /// root-level log aggregation, then the statistics and (when saving)
    /// the deferred report/detail payloads.
    pub async fn execute_case(
        &self,
        dal: &DAL,
        case: &CaseSummary,
        steps_tree: &[Step],
        report_type: ReportType,
        env_name: Option<String>,
        initial_variables: Vec<VariableItem>,
    ) -> Result<EngineRun> {
        let case_started = Local::now().naive_local();
        let report_code = self.save_report.then(unique_identify);
        let http: Arc<dyn HttpClient> = match &self.http_client {
            Some(client) => Arc::clone(client),
            None => Arc::new(ReqwestClient::new(&self.config)?),
        };

        let mut ctx = ExecutionContext::new(
            case.case_id,
            case.case_code.clone(),
            env_name,
            initial_variables,
            report_code.clone(),
            self.save_report,
            http,
            dal.clone(),
            self.config.clone(),
        );

        let mut ordered: Vec<&Step> = steps_tree.iter().collect();
        ordered.sort_by_key(|step| step.step_no);

        let mut results = Vec::new();
        for step in ordered {
            let outcome = steps::execute(step, &mut ctx).await;
            if step.parent_step_id.is_none() {
                aggregate_root_step_logs(&mut ctx, &outcome, &step.step_code);
            }
            results.push(outcome);
        }

        let statistics = compute_statistics(&results);
        let case_ended = Local::now().naive_local();
        let case_elapsed = (case_ended - case_started).num_milliseconds() as f64 / 1000.0;
        info!(
            case_id = case.case_id,
            total = statistics.total_steps,
            failed = statistics.failed_steps,
            "case execution finished"
        );

        let deferred_report = match &report_code {
            Some(code) => Some(NewReport {
                case_id: case.case_id,
                case_code: case.case_code.clone(),
                case_st_time: Some(case_started.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
                case_ed_time: Some(case_ended.format("%Y-%m-%d %H:%M:%S").to_string()),
                case_elapsed: Some(format!("{case_elapsed:.3}")),
                case_state: Some(statistics.failed_steps == 0),
                step_total: statistics.total_steps,
                step_fail_count: statistics.failed_steps,
                step_pass_count: statistics.success_steps,
                step_pass_ratio: statistics.pass_ratio,
                batch_code: self.batch_code.clone(),
                report_code: code.clone(),
                report_type,
                task_code: self.task_code.clone(),
                created_user: None,
            }),
            None => None,
        };
        let pending_details = ctx.pending_details.take().unwrap_or_default();

        Ok(EngineRun {
            results,
            logs: std::mem::take(&mut ctx.logs),
            report_code,
            statistics,
            session_variables: std::mem::take(&mut ctx.session_variables),
            deferred_report,
            pending_details,
        })
    }
}

/// Flattens a result tree into a list, parents before children.
pub fn collect_all_results(results: &[StepOutcome]) -> Vec<&StepOutcome> {
    let mut all = Vec::new();
    for result in results {
        all.push(result);
        all.extend(collect_all_results(&result.children));
    }
    all
}

/// Statistics deduplicated by step code: first occurrence wins, any
/// failed occurrence flips the entry to failed.
fn compute_statistics(results: &[StepOutcome]) -> RunStatistics {
    let mut states: BTreeMap<&str, bool> = BTreeMap::new();
    for outcome in collect_all_results(results) {
        let entry = states.entry(outcome.step_code.as_str()).or_insert(true);
        if !outcome.success {
            *entry = false;
        }
    }
    let total_steps = states.len() as u32;
    let success_steps = states.values().filter(|passed| **passed).count() as u32;
    let failed_steps = total_steps - success_steps;
    let pass_ratio = if total_steps > 0 {
        let ratio = f64::from(success_steps) / f64::from(total_steps) * 100.0;
        (ratio * 100.0).round() / 100.0
    } else {
        0.0
    };
    RunStatistics {
        total_steps,
        success_steps,
        failed_steps,
        pass_ratio,
    }
}

/// Appends the transcripts of every descendant (ascending step-code
/// order) to a root step's own transcript, producing one readable
/// per-root log.
fn aggregate_root_step_logs(ctx: &mut ExecutionContext, root: &StepOutcome, root_step_code: &str) {
    fn collect_codes(outcome: &StepOutcome, out: &mut Vec<String>) {
        out.push(outcome.step_code.clone());
        for child in &outcome.children {
            collect_codes(child, out);
        }
    }

    let mut descendant_codes = Vec::new();
    for child in &root.children {
        collect_codes(child, &mut descendant_codes);
    }
    descendant_codes.sort();

    let mut aggregated = Vec::new();
    for code in descendant_codes {
        if let Some(lines) = ctx.logs.get(&code) {
            aggregated.extend(lines.iter().cloned());
        }
    }
    if aggregated.is_empty() {
        return;
    }
    ctx.logs
        .entry(root_step_code.to_string())
        .or_default()
        .extend(aggregated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepType;

    fn outcome(step_code: &str, success: bool, children: Vec<StepOutcome>) -> StepOutcome {
        StepOutcome {
            case_id: 1,
            step_id: 1,
            step_no: 1,
            step_code: step_code.to_string(),
            step_name: step_code.to_string(),
            step_type: StepType::Wait,
            success,
            message: String::new(),
            error: None,
            response: None,
            elapsed: None,
            quote_case_id: None,
            extract_variables: Vec::new(),
            assert_validators: Vec::new(),
            children,
        }
    }

    #[test]
    fn test_statistics_dedupe_by_step_code() {
        // A loop body executed three times, failing once, counts as one
        // failed step.
        let results = vec![outcome(
            "loop",
            false,
            vec![
                outcome("child", true, Vec::new()),
                outcome("child", false, Vec::new()),
                outcome("child", true, Vec::new()),
            ],
        )];
        let stats = compute_statistics(&results);
        assert_eq!(stats.total_steps, 2);
        assert_eq!(stats.failed_steps, 2);
        assert_eq!(stats.success_steps, 0);
        assert_eq!(stats.pass_ratio, 0.0);
    }

    #[test]
    fn test_statistics_totals_agree() {
        let results = vec![
            outcome("a", true, Vec::new()),
            outcome("b", false, Vec::new()),
            outcome("c", true, Vec::new()),
        ];
        let stats = compute_statistics(&results);
        assert_eq!(stats.total_steps, stats.success_steps + stats.failed_steps);
        assert!((stats.pass_ratio - 66.67).abs() < 1e-9);
    }

    #[test]
    fn test_empty_run_has_zero_ratio() {
        let stats = compute_statistics(&[]);
        assert_eq!(stats.total_steps, 0);
        assert_eq!(stats.pass_ratio, 0.0);
    }
}

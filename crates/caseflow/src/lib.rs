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

//! # Caseflow
//!
//! Caseflow is an API test-case execution engine: it interprets
//! hierarchical cases — ordered trees of HTTP requests, scripted code,
//! waits, branches, loops, shared-case references and variable bindings —
//! against a configured environment, threads a variable pool through the
//! steps, extracts and asserts on responses, and produces reports with
//! per-step detail rows. A scheduler component runs these executions on
//! cron, interval or absolute-time schedules through a per-process worker
//! pool, with a per-dispatch execution record.
//!
//! ## Architecture
//!
//! - [`models`]: entities (projects, environments, cases, steps, reports,
//!   details, tasks, records) and the closed enums they share.
//! - [`database`] / [`dal`]: the typed-CRUD repository surface and the
//!   process-local store behind it.
//! - [`engine`]: placeholder resolution, the generator catalog, the
//!   execution context, the restricted script evaluator, the
//!   extract/assert pipeline, step executors, and the case orchestrator.
//! - [`runner`]: loads a case, runs the engine in deferred-save mode and
//!   persists report + details + case state in one transaction; batch and
//!   debug entry points.
//! - [`scheduler`]: the worker pool bridge, execution records, and the
//!   scan-and-dispatch sweep.
//!
//! ## Example
//!
//! ```rust,ignore
//! use caseflow::dal::DAL;
//! use caseflow::database::Database;
//! use caseflow::models::ReportType;
//! use caseflow::runner::CaseRunner;
//!
//! let dal = DAL::new(Database::new());
//! let runner = CaseRunner::new(dal);
//! let summary = runner
//!     .execute_single_case(case_id, ReportType::SyncExec, vec![], Some("prod".into()), None, None)
//!     .await?;
//! assert!(summary.saved_to_database);
//! ```

pub mod config;
pub mod dal;
pub mod database;
pub mod engine;
pub mod error;
pub mod models;
pub mod runner;
pub mod scheduler;

/// Initializes tracing with an env-filter; later calls are no-ops, so
/// tests and embedding binaries can call it unconditionally.
pub fn init_logging(default_filter: Option<&str>) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or("info")));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub use config::{EngineConfig, SchedulerConfig};
pub use dal::DAL;
pub use database::Database;
pub use engine::{EngineRun, ExecutionEngine, HttpClient, RunStatistics, StepOutcome};
pub use error::{Error, Result, StepError, StepErrorKind};
pub use runner::{BatchRunSummary, CaseRunSummary, CaseRunner};
pub use scheduler::TaskScheduler;

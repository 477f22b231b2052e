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

//! Data model for the caseflow platform.
//!
//! Every entity carries a surrogate integer `id` plus a business `code` —
//! an opaque 28-character string minted by [`unique_identify`] — and a
//! small-integer `state` for soft deletion (0 = active, 1 = deleted).
//! Reads always exclude `state = 1`.
//!
//! Ownership: a project owns environments, tags, cases and tasks; a case
//! owns steps; a report owns details; a task owns execution records.

pub mod case;
pub mod detail;
pub mod enums;
pub mod environment;
pub mod project;
pub mod record;
pub mod report;
pub mod step;
pub mod tag;
pub mod task;
pub mod variable;

pub use case::{Case, CaseSummary};
pub use detail::{Detail, NewDetail};
pub use enums::{
    CaseType, LoopErrorStrategy, LoopMode, ReportType, RequestArgsType, StepType, TaskScheduler,
    TaskStatus,
};
pub use environment::Environment;
pub use project::Project;
pub use record::{ExecutionRecord, NewExecutionRecord};
pub use report::{NewReport, Report};
pub use step::{AssertRule, ExtractRule, Step, StepRow, TreeCounter};
pub use tag::Tag;
pub use task::{ScheduledTask, TaskKwargs};
pub use variable::VariableItem;

use uuid::Uuid;

/// Mints a business identifier: the current unix second, a dash, and 17
/// uppercase hex characters — 28 characters total, stable across updates.
pub fn unique_identify() -> String {
    let secs = chrono::Utc::now().timestamp();
    let token = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}", secs, &token[..17])
}

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

//! Data Access Layer.
//!
//! [`DAL`] is the typed-CRUD facade over the store: one sub-DAL per
//! entity, borrowed from the root (`dal.cases()`, `dal.steps()`, …).
//! Every read filters soft-deleted rows; writes enforce the uniqueness
//! and ownership constraints of the data model.
//!
//! Cross-entity writes that must land atomically (report + details +
//! case-state update after a run) go through [`DAL::persist_case_run`],
//! which wraps them in one store transaction.

pub mod case;
pub mod detail;
pub mod environment;
pub mod project;
pub mod record;
pub mod report;
pub mod step;
pub mod tag;
pub mod task;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::database::Database;
use crate::error::Result;
use crate::models::{NewDetail, NewReport};

pub use case::CaseDal;
pub use detail::DetailDal;
pub use environment::EnvironmentDal;
pub use project::ProjectDal;
pub use record::RecordDal;
pub use report::ReportDal;
pub use step::StepDal;
pub use tag::TagDal;
pub use task::TaskDal;

/// Current wall-clock time as stored in rows.
pub(crate) fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Data access layer root.
#[derive(Debug, Clone)]
pub struct DAL {
    pub(crate) database: Database,
}

impl DAL {
    /// Creates a new DAL over the given database handle.
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn projects(&self) -> ProjectDal<'_> {
        ProjectDal::new(self)
    }

    pub fn environments(&self) -> EnvironmentDal<'_> {
        EnvironmentDal::new(self)
    }

    pub fn tags(&self) -> TagDal<'_> {
        TagDal::new(self)
    }

    pub fn cases(&self) -> CaseDal<'_> {
        CaseDal::new(self)
    }

    pub fn steps(&self) -> StepDal<'_> {
        StepDal::new(self)
    }

    pub fn reports(&self) -> ReportDal<'_> {
        ReportDal::new(self)
    }

    pub fn details(&self) -> DetailDal<'_> {
        DetailDal::new(self)
    }

    pub fn tasks(&self) -> TaskDal<'_> {
        TaskDal::new(self)
    }

    pub fn records(&self) -> RecordDal<'_> {
        RecordDal::new(self)
    }

    /// Persists one finished run in a single short transaction: the
    /// report, every buffered detail (stamped with the final
    /// `report_code`), and the case's last-run state. Any failure rolls
    /// all three back.
    ///
    /// Returns the `report_code` of the created report.
    pub async fn persist_case_run(
        &self,
        report: NewReport,
        details: Vec<NewDetail>,
        case_state: bool,
        case_last_time: Option<NaiveDateTime>,
    ) -> Result<String> {
        let case_id = report.case_id;
        let report_code = self.database.transaction(|store| {
            let created = report::insert_report(store, report)?;
            let report_code = created.report_code.clone();
            for mut detail in details {
                detail.report_code = report_code.clone();
                detail::insert_detail(store, detail)?;
            }
            case::update_run_state(store, case_id, case_state, case_last_time)?;
            Ok(report_code)
        })?;
        debug!(case_id, %report_code, "persisted case run");
        Ok(report_code)
    }
}

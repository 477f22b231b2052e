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

//! Report DAL.

use super::{now, DAL};
use crate::database::Store;
use crate::error::{Error, Result};
use crate::models::{unique_identify, NewReport, Report};

/// Data access layer for report operations.
#[derive(Clone)]
pub struct ReportDal<'a> {
    dal: &'a DAL,
}

impl<'a> ReportDal<'a> {
    /// Creates a new ReportDal instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Creates a report row from the payload; an empty `report_code`
    /// gets a freshly minted one.
    pub async fn create(&self, new: NewReport) -> Result<Report> {
        let mut store = self.dal.database.write();
        insert_report(&mut store, new)
    }

    /// Reports of one case, newest last.
    pub async fn list_by_case(&self, case_id: i64) -> Result<Vec<Report>> {
        Ok(self
            .dal
            .database
            .read()
            .reports
            .iter()
            .filter(|r| r.state == 0 && r.case_id == case_id)
            .cloned()
            .collect())
    }

    pub async fn get_by_code(&self, report_code: &str) -> Result<Report> {
        self.dal
            .database
            .read()
            .reports
            .iter()
            .find(|r| r.report_code == report_code && r.state == 0)
            .cloned()
            .ok_or_else(|| Error::not_found("report", format!("code={report_code}")))
    }
}

/// Store-level insert, shared with the persistence transaction.
pub(crate) fn insert_report(store: &mut Store, mut new: NewReport) -> Result<Report> {
    if new.report_code.is_empty() {
        new.report_code = unique_identify();
    }
    if store
        .reports
        .iter()
        .any(|r| r.report_code == new.report_code)
    {
        return Err(Error::conflict(format!(
            "report code already exists: {}",
            new.report_code
        )));
    }
    let ts = now();
    let report = Report {
        id: store.allocate_id(),
        case_id: new.case_id,
        case_code: new.case_code,
        case_st_time: new.case_st_time,
        case_ed_time: new.case_ed_time,
        case_elapsed: new.case_elapsed,
        case_state: new.case_state,
        step_total: new.step_total,
        step_fail_count: new.step_fail_count,
        step_pass_count: new.step_pass_count,
        step_pass_ratio: new.step_pass_ratio,
        batch_code: new.batch_code,
        report_code: new.report_code,
        report_type: new.report_type,
        task_code: new.task_code,
        created_user: new.created_user,
        created_time: ts,
        updated_time: ts,
        state: 0,
    };
    store.reports.push(report.clone());
    Ok(report)
}

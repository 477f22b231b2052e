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

//! Detail DAL. `(report_code, case_code, step_code, num_cycles)` is
//! unique, which keeps loop iterations individually addressable.

use super::{now, DAL};
use crate::database::Store;
use crate::error::{Error, Result};
use crate::models::{Detail, NewDetail};

/// Data access layer for detail operations.
#[derive(Clone)]
pub struct DetailDal<'a> {
    dal: &'a DAL,
}

impl<'a> DetailDal<'a> {
    /// Creates a new DetailDal instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn create(&self, new: NewDetail) -> Result<Detail> {
        let mut store = self.dal.database.write();
        insert_detail(&mut store, new)
    }

    /// Details of one run, in insertion (execution) order.
    pub async fn list_by_report(&self, report_code: &str) -> Result<Vec<Detail>> {
        Ok(self
            .dal
            .database
            .read()
            .details
            .iter()
            .filter(|d| d.state == 0 && d.report_code == report_code)
            .cloned()
            .collect())
    }
}

/// Store-level insert, shared with the persistence transaction.
pub(crate) fn insert_detail(store: &mut Store, new: NewDetail) -> Result<Detail> {
    let duplicate = store.details.iter().any(|d| {
        d.state == 0
            && d.report_code == new.report_code
            && d.case_code == new.case_code
            && d.step_code == new.step_code
            && d.num_cycles == new.num_cycles
    });
    if duplicate {
        return Err(Error::conflict(format!(
            "detail already exists: report={}, step={}, cycle={:?}",
            new.report_code, new.step_code, new.num_cycles
        )));
    }
    let ts = now();
    let detail = Detail {
        id: store.allocate_id(),
        case_id: new.case_id,
        case_code: new.case_code,
        report_code: new.report_code,
        quote_case_id: new.quote_case_id,
        step_id: new.step_id,
        step_no: new.step_no,
        step_name: new.step_name,
        step_code: new.step_code,
        step_type: new.step_type,
        step_state: new.step_state,
        step_st_time: new.step_st_time,
        step_ed_time: new.step_ed_time,
        step_elapsed: new.step_elapsed,
        step_exec_logger: new.step_exec_logger,
        step_exec_except: new.step_exec_except,
        response_cookie: new.response_cookie,
        response_header: new.response_header,
        response_body: new.response_body,
        response_text: new.response_text,
        response_elapsed: new.response_elapsed,
        session_variables: new.session_variables,
        defined_variables: new.defined_variables,
        extract_variables: new.extract_variables,
        assert_validators: new.assert_validators,
        num_cycles: new.num_cycles,
        created_time: ts,
        updated_time: ts,
        state: 0,
    };
    store.details.push(detail.clone());
    Ok(detail)
}

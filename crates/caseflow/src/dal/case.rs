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

//! Case DAL.
//!
//! `(case_name, case_project, created_user)` is unique among active rows;
//! `case_version` is bumped on every successful update. A case referenced
//! by another case's quote step cannot be deleted.

use chrono::NaiveDateTime;

use super::{now, DAL};
use crate::database::Store;
use crate::error::{Error, Result};
use crate::models::{unique_identify, Case, CaseType, VariableItem};

/// Data access layer for case operations.
#[derive(Clone)]
pub struct CaseDal<'a> {
    dal: &'a DAL,
}

impl<'a> CaseDal<'a> {
    /// Creates a new CaseDal instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Creates a case.
    pub async fn create(
        &self,
        case_project: i64,
        case_name: &str,
        case_type: Option<CaseType>,
        session_variables: Vec<VariableItem>,
        created_user: Option<&str>,
    ) -> Result<Case> {
        let mut store = self.dal.database.write();
        if store.cases.iter().any(|c| {
            c.state == 0
                && c.case_project == case_project
                && c.case_name == case_name
                && c.created_user.as_deref() == created_user
        }) {
            return Err(Error::conflict(format!(
                "case already exists: name={case_name}, project={case_project}"
            )));
        }
        let ts = now();
        let case = Case {
            id: store.allocate_id(),
            case_name: case_name.to_string(),
            case_desc: None,
            case_tags: Vec::new(),
            case_type,
            case_code: unique_identify(),
            case_steps: 0,
            case_state: None,
            case_version: 1,
            case_project,
            case_last_time: None,
            session_variables,
            created_user: created_user.map(str::to_string),
            created_time: ts,
            updated_time: ts,
            state: 0,
        };
        store.cases.push(case.clone());
        Ok(case)
    }

    pub async fn get_by_id(&self, case_id: i64) -> Result<Case> {
        self.dal
            .database
            .read()
            .cases
            .iter()
            .find(|c| c.id == case_id && c.state == 0)
            .cloned()
            .ok_or_else(|| Error::not_found("case", format!("id={case_id}")))
    }

    pub async fn get_by_code(&self, case_code: &str) -> Result<Case> {
        self.dal
            .database
            .read()
            .cases
            .iter()
            .find(|c| c.case_code == case_code && c.state == 0)
            .cloned()
            .ok_or_else(|| Error::not_found("case", format!("code={case_code}")))
    }

    /// Looks up a public-script case by id. A private case behind the
    /// same id is reported as not found, which is how the write-time
    /// quote invariant is enforced at read time.
    pub async fn get_public_script(&self, case_id: i64) -> Result<Case> {
        self.dal
            .database
            .read()
            .cases
            .iter()
            .find(|c| {
                c.id == case_id && c.state == 0 && c.case_type == Some(CaseType::PublicScript)
            })
            .cloned()
            .ok_or_else(|| {
                Error::not_found("case", format!("id={case_id} with type PUBLIC_SCRIPT"))
            })
    }

    /// Renames / re-types a case, bumping `case_version`.
    pub async fn update(
        &self,
        case_id: i64,
        case_name: Option<&str>,
        case_type: Option<CaseType>,
        session_variables: Option<Vec<VariableItem>>,
    ) -> Result<Case> {
        let mut store = self.dal.database.write();
        let case = store
            .cases
            .iter_mut()
            .find(|c| c.id == case_id && c.state == 0)
            .ok_or_else(|| Error::not_found("case", format!("id={case_id}")))?;
        if let Some(name) = case_name {
            case.case_name = name.to_string();
        }
        if let Some(kind) = case_type {
            case.case_type = Some(kind);
        }
        if let Some(vars) = session_variables {
            case.session_variables = vars;
        }
        case.case_version += 1;
        case.updated_time = now();
        Ok(case.clone())
    }

    /// Records the outcome and timestamp of the latest run.
    pub async fn update_run_state(
        &self,
        case_id: i64,
        case_state: bool,
        case_last_time: Option<NaiveDateTime>,
    ) -> Result<()> {
        let mut store = self.dal.database.write();
        update_run_state(&mut store, case_id, case_state, case_last_time)
    }

    /// Soft-deletes a case and its steps. Rejected while another case's
    /// quote step still references it.
    pub async fn delete(&self, case_id: i64) -> Result<()> {
        let mut store = self.dal.database.write();
        let quoted = store
            .steps
            .iter()
            .any(|s| s.state == 0 && s.quote_case_id == Some(case_id) && s.case_id != case_id);
        if quoted {
            return Err(Error::conflict(format!(
                "case {case_id} is referenced by quote steps of other cases"
            )));
        }
        let ts = now();
        let case = store
            .cases
            .iter_mut()
            .find(|c| c.id == case_id && c.state == 0)
            .ok_or_else(|| Error::not_found("case", format!("id={case_id}")))?;
        case.state = 1;
        case.updated_time = ts;
        for step in store.steps.iter_mut().filter(|s| s.case_id == case_id) {
            step.state = 1;
            step.updated_time = ts;
        }
        Ok(())
    }
}

/// Store-level run-state update, shared with the persistence transaction.
pub(crate) fn update_run_state(
    store: &mut Store,
    case_id: i64,
    case_state: bool,
    case_last_time: Option<NaiveDateTime>,
) -> Result<()> {
    let case = store
        .cases
        .iter_mut()
        .find(|c| c.id == case_id && c.state == 0)
        .ok_or_else(|| Error::not_found("case", format!("id={case_id}")))?;
    case.case_state = Some(case_state);
    case.case_last_time = case_last_time;
    case.updated_time = now();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[tokio::test]
    async fn test_update_bumps_version() {
        let dal = DAL::new(Database::new());
        let project = dal.projects().create("shop", None).await.unwrap();
        let case = dal
            .cases()
            .create(project.id, "login", None, Vec::new(), Some("qa"))
            .await
            .unwrap();
        assert_eq!(case.case_version, 1);
        let updated = dal
            .cases()
            .update(case.id, Some("login-v2"), None, None)
            .await
            .unwrap();
        assert_eq!(updated.case_version, 2);
    }

    #[tokio::test]
    async fn test_public_script_lookup_rejects_private_cases() {
        let dal = DAL::new(Database::new());
        let project = dal.projects().create("shop", None).await.unwrap();
        let private = dal
            .cases()
            .create(
                project.id,
                "private",
                Some(CaseType::PrivateScript),
                Vec::new(),
                None,
            )
            .await
            .unwrap();
        assert!(dal.cases().get_public_script(private.id).await.is_err());
    }
}

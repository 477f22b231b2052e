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

//! Step DAL.
//!
//! Writes validate the structural invariants of the step tree: only LOOP
//! and IF steps may own children, a parent must live in the same case,
//! parent chains stay acyclic, and a quote reference must point at an
//! existing case. Reads materialize the normalized recursive [`Step`]
//! shape the engine consumes — children nested, quoted case trees inlined
//! under `quote_steps`, and `conditions` collapsed to a single-object JSON
//! string — together with the recursive [`TreeCounter`].

use serde_json::Value;
use tracing::debug;

use super::{now, DAL};
use crate::database::Store;
use crate::error::{Error, Result};
use crate::models::{unique_identify, Step, StepRow, TreeCounter};

/// Data access layer for step operations.
#[derive(Clone)]
pub struct StepDal<'a> {
    dal: &'a DAL,
}

impl<'a> StepDal<'a> {
    /// Creates a new StepDal instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a step row, validating tree invariants. Ids, codes and
    /// timestamps on the payload are replaced.
    pub async fn create(&self, mut row: StepRow) -> Result<StepRow> {
        let mut store = self.dal.database.write();
        validate_row(&store, &row, None)?;
        row.id = store.allocate_id();
        if row.step_code.is_empty() {
            row.step_code = unique_identify();
        }
        let ts = now();
        row.created_time = ts;
        row.updated_time = ts;
        row.state = 0;
        store.steps.push(row.clone());
        refresh_case_step_count(&mut store, row.case_id);
        Ok(row)
    }

    /// Re-parents or reconfigures a step, re-validating the tree
    /// (including the no-cycles walk along the new parent chain).
    pub async fn update(&self, row: StepRow) -> Result<StepRow> {
        let mut store = self.dal.database.write();
        let step_id = row.id;
        if !store.steps.iter().any(|s| s.id == step_id && s.state == 0) {
            return Err(Error::not_found("step", format!("id={step_id}")));
        }
        validate_row(&store, &row, Some(step_id))?;
        let existing = store
            .steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| Error::not_found("step", format!("id={step_id}")))?;
        let mut updated = row;
        updated.step_code = existing.step_code.clone();
        updated.created_time = existing.created_time;
        updated.updated_time = now();
        updated.state = 0;
        *existing = updated.clone();
        Ok(updated)
    }

    /// Soft-deletes a step and, recursively, its children.
    pub async fn delete(&self, step_id: i64) -> Result<()> {
        let mut store = self.dal.database.write();
        if !store.steps.iter().any(|s| s.id == step_id && s.state == 0) {
            return Err(Error::not_found("step", format!("id={step_id}")));
        }
        let mut pending = vec![step_id];
        let ts = now();
        let mut case_id = None;
        while let Some(id) = pending.pop() {
            for step in store.steps.iter_mut().filter(|s| s.state == 0) {
                if step.parent_step_id == Some(id) {
                    pending.push(step.id);
                }
            }
            if let Some(step) = store.steps.iter_mut().find(|s| s.id == id && s.state == 0) {
                step.state = 1;
                step.updated_time = ts;
                case_id = Some(step.case_id);
            }
        }
        if let Some(case_id) = case_id {
            refresh_case_step_count(&mut store, case_id);
        }
        Ok(())
    }

    /// Materializes the full step tree of a case, quoted trees included,
    /// with the recursive step counter.
    pub async fn tree_by_case(&self, case_id: i64) -> Result<(Vec<Step>, TreeCounter)> {
        let store = self.dal.database.read();
        if !store.cases.iter().any(|c| c.id == case_id && c.state == 0) {
            return Err(Error::not_found("case", format!("id={case_id}")));
        }
        let mut counter = TreeCounter::default();
        let mut quote_path = vec![case_id];
        let roots = root_rows(&store, case_id);
        let tree = roots
            .into_iter()
            .map(|row| build_node(&store, row, false, &mut counter, &mut quote_path))
            .collect::<Vec<_>>();
        debug!(
            case_id,
            total = counter.total_steps,
            direct = counter.direct_steps,
            "materialized step tree"
        );
        Ok((tree, counter))
    }
}

fn root_rows<'s>(store: &'s Store, case_id: i64) -> Vec<&'s StepRow> {
    let mut roots: Vec<&StepRow> = store
        .steps
        .iter()
        .filter(|s| s.state == 0 && s.case_id == case_id && s.parent_step_id.is_none())
        .collect();
    roots.sort_by_key(|s| s.step_no);
    roots
}

fn build_node(
    store: &Store,
    row: &StepRow,
    is_quote: bool,
    counter: &mut TreeCounter,
    quote_path: &mut Vec<i64>,
) -> Step {
    counter.total_steps += 1;
    if is_quote {
        counter.quote_steps += 1;
    } else if row.parent_step_id.is_none() {
        counter.direct_steps += 1;
    } else {
        counter.child_steps += 1;
    }

    let mut children: Vec<&StepRow> = store
        .steps
        .iter()
        .filter(|s| s.state == 0 && s.parent_step_id == Some(row.id))
        .collect();
    children.sort_by_key(|s| s.step_no);
    let children = children
        .into_iter()
        .map(|child| build_node(store, child, is_quote, counter, quote_path))
        .collect();

    // Inline the quoted case's root trees, guarding against quote cycles.
    let mut quote_steps = Vec::new();
    if let Some(quote_case_id) = row.quote_case_id {
        let target_exists = store
            .cases
            .iter()
            .any(|c| c.id == quote_case_id && c.state == 0);
        if target_exists && !quote_path.contains(&quote_case_id) {
            quote_path.push(quote_case_id);
            quote_steps = root_rows(store, quote_case_id)
                .into_iter()
                .map(|quote_row| build_node(store, quote_row, true, counter, quote_path))
                .collect();
            quote_path.pop();
        }
    }

    Step {
        step_id: row.id,
        case_id: row.case_id,
        step_no: row.step_no,
        step_code: row.step_code.clone(),
        step_name: row.step_name.clone(),
        step_type: row.step_type,
        parent_step_id: row.parent_step_id,
        quote_case_id: row.quote_case_id,
        request_url: row.request_url.clone(),
        request_port: row.request_port.clone(),
        request_method: row.request_method.clone(),
        request_header: row.request_header.clone(),
        request_params: row.request_params.clone(),
        request_form_data: row.request_form_data.clone(),
        request_form_file: row.request_form_file.clone(),
        request_form_urlencoded: row.request_form_urlencoded.clone(),
        request_body: row.request_body.clone(),
        request_text: row.request_text.clone(),
        request_args_type: row.request_args_type,
        request_project_id: row.request_project_id,
        code: row.code.clone(),
        wait: row.wait,
        loop_mode: row.loop_mode,
        loop_maximums: row.loop_maximums,
        loop_interval: row.loop_interval,
        loop_iterable: row.loop_iterable.clone(),
        loop_iter_idx: row.loop_iter_idx.clone(),
        loop_iter_key: row.loop_iter_key.clone(),
        loop_iter_val: row.loop_iter_val.clone(),
        loop_on_error: row.loop_on_error,
        loop_timeout: row.loop_timeout,
        conditions: normalize_conditions(row.conditions.as_ref()),
        session_variables: row.session_variables.clone(),
        defined_variables: row.defined_variables.clone(),
        extract_variables: row.extract_variables.clone(),
        assert_validators: row.assert_validators.clone(),
        children,
        quote_steps,
    }
}

/// Collapses a stored conditions value to a single-object JSON string:
/// arrays contribute their first entry, objects serialize as-is.
fn normalize_conditions(raw: Option<&Value>) -> Option<String> {
    match raw {
        Some(Value::Array(items)) => items.first().map(|item| item.to_string()),
        Some(Value::Object(_)) => raw.map(|v| v.to_string()),
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn validate_row(store: &Store, row: &StepRow, updating: Option<i64>) -> Result<()> {
    if !store.cases.iter().any(|c| c.id == row.case_id && c.state == 0) {
        return Err(Error::not_found("case", format!("id={}", row.case_id)));
    }
    if store.steps.iter().any(|s| {
        s.state == 0
            && s.case_id == row.case_id
            && s.step_no == row.step_no
            && Some(s.id) != updating
    }) {
        return Err(Error::conflict(format!(
            "step_no {} already used in case {}",
            row.step_no, row.case_id
        )));
    }
    if let Some(parent_id) = row.parent_step_id {
        let parent = store
            .steps
            .iter()
            .find(|s| s.id == parent_id && s.state == 0)
            .ok_or_else(|| Error::not_found("step", format!("parent id={parent_id}")))?;
        if parent.case_id != row.case_id {
            return Err(Error::parameter(format!(
                "parent step {parent_id} belongs to another case"
            )));
        }
        if !parent.step_type.allows_children() {
            return Err(Error::parameter(format!(
                "step type {:?} does not allow children; only LOOP and IF do",
                parent.step_type
            )));
        }
        if let Some(own_id) = updating {
            // Walk up from the new parent; hitting ourselves means a cycle.
            let mut cursor = Some(parent_id);
            while let Some(id) = cursor {
                if id == own_id {
                    return Err(Error::parameter(format!(
                        "re-parenting step {own_id} under {parent_id} would create a cycle"
                    )));
                }
                cursor = store
                    .steps
                    .iter()
                    .find(|s| s.id == id)
                    .and_then(|s| s.parent_step_id);
            }
        }
    }
    if let Some(quote_case_id) = row.quote_case_id {
        if !store
            .cases
            .iter()
            .any(|c| c.id == quote_case_id && c.state == 0)
        {
            return Err(Error::not_found(
                "case",
                format!("quote_case_id={quote_case_id}"),
            ));
        }
    }
    Ok(())
}

fn refresh_case_step_count(store: &mut Store, case_id: i64) {
    let count = store
        .steps
        .iter()
        .filter(|s| s.state == 0 && s.case_id == case_id)
        .count() as u32;
    if let Some(case) = store.cases.iter_mut().find(|c| c.id == case_id) {
        case.case_steps = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::models::{CaseType, StepType};
    use serde_json::json;

    async fn seeded() -> (DAL, i64) {
        let dal = DAL::new(Database::new());
        let project = dal.projects().create("shop", None).await.unwrap();
        let case = dal
            .cases()
            .create(project.id, "login", None, Vec::new(), None)
            .await
            .unwrap();
        (dal, case.id)
    }

    #[tokio::test]
    async fn test_only_loop_and_if_can_parent() {
        let (dal, case_id) = seeded().await;
        let wait = dal
            .steps()
            .create(StepRow::new(case_id, 1, "wait", StepType::Wait))
            .await
            .unwrap();
        let mut child = StepRow::new(case_id, 2, "child", StepType::Wait);
        child.parent_step_id = Some(wait.id);
        assert!(dal.steps().create(child).await.is_err());

        let looped = dal
            .steps()
            .create(StepRow::new(case_id, 3, "loop", StepType::Loop))
            .await
            .unwrap();
        let mut ok_child = StepRow::new(case_id, 4, "child", StepType::Wait);
        ok_child.parent_step_id = Some(looped.id);
        assert!(dal.steps().create(ok_child).await.is_ok());
    }

    #[tokio::test]
    async fn test_parent_must_share_case() {
        let (dal, case_id) = seeded().await;
        let other = dal
            .cases()
            .create(1, "other", None, Vec::new(), None)
            .await
            .unwrap();
        let parent = dal
            .steps()
            .create(StepRow::new(other.id, 1, "loop", StepType::Loop))
            .await
            .unwrap();
        let mut child = StepRow::new(case_id, 1, "child", StepType::Wait);
        child.parent_step_id = Some(parent.id);
        assert!(dal.steps().create(child).await.is_err());
    }

    #[tokio::test]
    async fn test_update_rejects_parent_cycles() {
        let (dal, case_id) = seeded().await;
        let outer = dal
            .steps()
            .create(StepRow::new(case_id, 1, "outer", StepType::Loop))
            .await
            .unwrap();
        let mut inner = StepRow::new(case_id, 2, "inner", StepType::Loop);
        inner.parent_step_id = Some(outer.id);
        let inner = dal.steps().create(inner).await.unwrap();

        let mut reparented = outer.clone();
        reparented.parent_step_id = Some(inner.id);
        assert!(dal.steps().update(reparented).await.is_err());
    }

    #[tokio::test]
    async fn test_tree_counts_and_quote_inlining() {
        let (dal, case_id) = seeded().await;
        let public = dal
            .cases()
            .create(1, "shared", Some(CaseType::PublicScript), Vec::new(), None)
            .await
            .unwrap();
        dal.steps()
            .create(StepRow::new(public.id, 1, "shared-wait", StepType::Wait))
            .await
            .unwrap();

        dal.steps()
            .create(StepRow::new(case_id, 1, "first", StepType::Wait))
            .await
            .unwrap();
        let mut quote = StepRow::new(case_id, 2, "quote", StepType::Quote);
        quote.quote_case_id = Some(public.id);
        dal.steps().create(quote).await.unwrap();

        let (tree, counter) = dal.steps().tree_by_case(case_id).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(counter.direct_steps, 2);
        assert_eq!(counter.quote_steps, 1);
        assert_eq!(counter.total_steps, 3);
        assert_eq!(tree[1].quote_steps.len(), 1);
    }

    #[tokio::test]
    async fn test_conditions_array_collapses_to_first_object() {
        let (dal, case_id) = seeded().await;
        let mut row = StepRow::new(case_id, 1, "branch", StepType::If);
        row.conditions = Some(json!([
            {"value": "${flag}", "operation": "等于", "except_value": 1, "desc": "flag"},
            {"value": "ignored", "operation": "等于", "except_value": 2}
        ]));
        dal.steps().create(row).await.unwrap();
        let (tree, _) = dal.steps().tree_by_case(case_id).await.unwrap();
        let conditions = tree[0].conditions.as_deref().unwrap();
        let parsed: Value = serde_json::from_str(conditions).unwrap();
        assert_eq!(parsed["except_value"], json!(1));
    }
}

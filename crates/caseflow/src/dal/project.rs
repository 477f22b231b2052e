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

//! Project DAL.

use super::{now, DAL};
use crate::error::{Error, Result};
use crate::models::{unique_identify, Project};

/// Data access layer for project operations.
#[derive(Clone)]
pub struct ProjectDal<'a> {
    dal: &'a DAL,
}

impl<'a> ProjectDal<'a> {
    /// Creates a new ProjectDal instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Creates a project. `project_name` must be unique among active rows.
    pub async fn create(
        &self,
        project_name: &str,
        project_desc: Option<&str>,
    ) -> Result<Project> {
        let mut store = self.dal.database.write();
        if store
            .projects
            .iter()
            .any(|p| p.state == 0 && p.project_name == project_name)
        {
            return Err(Error::conflict(format!(
                "project name already exists: {project_name}"
            )));
        }
        let ts = now();
        let project = Project {
            id: store.allocate_id(),
            project_name: project_name.to_string(),
            project_desc: project_desc.map(str::to_string),
            project_state: None,
            project_code: unique_identify(),
            created_time: ts,
            updated_time: ts,
            state: 0,
        };
        store.projects.push(project.clone());
        Ok(project)
    }

    pub async fn get_by_id(&self, project_id: i64) -> Result<Project> {
        self.dal
            .database
            .read()
            .projects
            .iter()
            .find(|p| p.id == project_id && p.state == 0)
            .cloned()
            .ok_or_else(|| Error::not_found("project", format!("id={project_id}")))
    }

    /// Soft-deletes a project. Rejected while the project still owns
    /// active environments, cases, tags or tasks.
    pub async fn delete(&self, project_id: i64) -> Result<()> {
        let mut store = self.dal.database.write();
        let owns_envs = store
            .environments
            .iter()
            .any(|e| e.state == 0 && e.project_id == project_id);
        let owns_cases = store
            .cases
            .iter()
            .any(|c| c.state == 0 && c.case_project == project_id);
        let owns_tags = store
            .tags
            .iter()
            .any(|t| t.state == 0 && t.tag_project == project_id);
        let owns_tasks = store
            .tasks
            .iter()
            .any(|t| t.state == 0 && t.task_project == project_id);
        if owns_envs || owns_cases || owns_tags || owns_tasks {
            return Err(Error::conflict(format!(
                "project {project_id} still owns environments, cases, tags or tasks"
            )));
        }
        let project = store
            .projects
            .iter_mut()
            .find(|p| p.id == project_id && p.state == 0)
            .ok_or_else(|| Error::not_found("project", format!("id={project_id}")))?;
        project.state = 1;
        project.updated_time = now();
        Ok(())
    }
}

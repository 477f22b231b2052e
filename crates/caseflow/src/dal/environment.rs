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

//! Environment DAL. HTTP steps resolve `(project_id, env_name)` through
//! here when their request URL is relative.

use super::{now, DAL};
use crate::error::{Error, Result};
use crate::models::{unique_identify, Environment};

/// Data access layer for environment operations.
#[derive(Clone)]
pub struct EnvironmentDal<'a> {
    dal: &'a DAL,
}

impl<'a> EnvironmentDal<'a> {
    /// Creates a new EnvironmentDal instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Creates an environment; `(project_id, env_name)` must be unique.
    pub async fn create(
        &self,
        project_id: i64,
        env_name: &str,
        env_host: &str,
        env_port: u16,
    ) -> Result<Environment> {
        let mut store = self.dal.database.write();
        if !store
            .projects
            .iter()
            .any(|p| p.id == project_id && p.state == 0)
        {
            return Err(Error::not_found("project", format!("id={project_id}")));
        }
        if store
            .environments
            .iter()
            .any(|e| e.state == 0 && e.project_id == project_id && e.env_name == env_name)
        {
            return Err(Error::conflict(format!(
                "environment already exists: project_id={project_id}, env_name={env_name}"
            )));
        }
        let ts = now();
        let environment = Environment {
            id: store.allocate_id(),
            project_id,
            env_name: env_name.to_string(),
            env_host: env_host.to_string(),
            env_port,
            env_code: unique_identify(),
            created_time: ts,
            updated_time: ts,
            state: 0,
        };
        store.environments.push(environment.clone());
        Ok(environment)
    }

    /// Looks up the environment for `(project_id, env_name)`, if any.
    pub async fn get_by_project_and_name(
        &self,
        project_id: i64,
        env_name: &str,
    ) -> Result<Option<Environment>> {
        Ok(self
            .dal
            .database
            .read()
            .environments
            .iter()
            .find(|e| e.state == 0 && e.project_id == project_id && e.env_name == env_name)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use crate::dal::DAL;
    use crate::database::Database;

    #[tokio::test]
    async fn test_environment_unique_per_project_and_name() {
        let dal = DAL::new(Database::new());
        let project = dal.projects().create("shop", None).await.unwrap();
        dal.environments()
            .create(project.id, "prod", "https://api.test", 443)
            .await
            .unwrap();
        assert!(dal
            .environments()
            .create(project.id, "prod", "https://api.test", 8443)
            .await
            .is_err());
        // Same name under another project is fine.
        let other = dal.projects().create("pay", None).await.unwrap();
        assert!(dal
            .environments()
            .create(other.id, "prod", "https://pay.test", 443)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_lookup_misses_return_none() {
        let dal = DAL::new(Database::new());
        let found = dal
            .environments()
            .get_by_project_and_name(9, "prod")
            .await
            .unwrap();
        assert!(found.is_none());
    }
}

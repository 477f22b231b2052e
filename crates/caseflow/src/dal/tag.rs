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

//! Tag DAL.

use super::{now, DAL};
use crate::error::{Error, Result};
use crate::models::{unique_identify, Tag};

/// Data access layer for tag operations.
#[derive(Clone)]
pub struct TagDal<'a> {
    dal: &'a DAL,
}

impl<'a> TagDal<'a> {
    /// Creates a new TagDal instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Creates a tag; `(tag_project, tag_type, tag_mode, tag_name)` must
    /// be unique among active rows.
    pub async fn create(
        &self,
        tag_project: i64,
        tag_type: &str,
        tag_mode: Option<&str>,
        tag_name: Option<&str>,
    ) -> Result<Tag> {
        let mut store = self.dal.database.write();
        if store.tags.iter().any(|t| {
            t.state == 0
                && t.tag_project == tag_project
                && t.tag_type == tag_type
                && t.tag_mode.as_deref() == tag_mode
                && t.tag_name.as_deref() == tag_name
        }) {
            return Err(Error::conflict(format!(
                "tag already exists: project={tag_project}, type={tag_type}, \
                 mode={tag_mode:?}, name={tag_name:?}"
            )));
        }
        let ts = now();
        let tag = Tag {
            id: store.allocate_id(),
            tag_code: unique_identify(),
            tag_type: tag_type.to_string(),
            tag_project,
            tag_mode: tag_mode.map(str::to_string),
            tag_name: tag_name.map(str::to_string),
            tag_desc: None,
            created_time: ts,
            updated_time: ts,
            state: 0,
        };
        store.tags.push(tag.clone());
        Ok(tag)
    }

    /// Soft-deletes a tag; rejected while any active case references it.
    pub async fn delete(&self, tag_id: i64) -> Result<()> {
        let mut store = self.dal.database.write();
        if store
            .cases
            .iter()
            .any(|c| c.state == 0 && c.case_tags.contains(&tag_id))
        {
            return Err(Error::conflict(format!(
                "tag {tag_id} is still referenced by active cases"
            )));
        }
        let tag = store
            .tags
            .iter_mut()
            .find(|t| t.id == tag_id && t.state == 0)
            .ok_or_else(|| Error::not_found("tag", format!("id={tag_id}")))?;
        tag.state = 1;
        tag.updated_time = now();
        Ok(())
    }
}

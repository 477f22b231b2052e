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

//! Process-local storage backing the DAL.
//!
//! Persistence proper is outside this crate: the repository layer is an
//! opaque, typed-CRUD surface, and this module provides the in-memory
//! store it fronts. [`Database`] is a cheaply cloneable handle; all tables
//! live behind one lock so [`Database::transaction`] can give real
//! all-or-nothing semantics by snapshotting the store and restoring it
//! when the closure fails.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use crate::models::{
    Case, Detail, Environment, ExecutionRecord, Project, Report, ScheduledTask, StepRow, Tag,
};

/// All tables, plus the shared id sequence.
#[derive(Debug, Default, Clone)]
pub struct Store {
    next_id: i64,
    pub projects: Vec<Project>,
    pub environments: Vec<Environment>,
    pub tags: Vec<Tag>,
    pub cases: Vec<Case>,
    pub steps: Vec<StepRow>,
    pub reports: Vec<Report>,
    pub details: Vec<Detail>,
    pub tasks: Vec<ScheduledTask>,
    pub records: Vec<ExecutionRecord>,
}

impl Store {
    /// Allocates the next surrogate id.
    pub fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Handle to the shared store.
#[derive(Debug, Clone, Default)]
pub struct Database {
    inner: Arc<RwLock<Store>>,
}

impl Database {
    pub fn new() -> Self {
        Database::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.inner.write()
    }

    /// Runs `f` against the store with rollback-on-error semantics: the
    /// store is snapshotted up front and restored wholesale if the
    /// closure returns an error, so a multi-row write either lands
    /// completely or not at all.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Store) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.write();
        let snapshot = guard.clone();
        match f(&mut guard) {
            Ok(value) => Ok(value),
            Err(err) => {
                *guard = snapshot;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_allocate_id_is_monotonic() {
        let db = Database::new();
        let a = db.write().allocate_id();
        let b = db.write().allocate_id();
        assert!(b > a);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::new();
        let result: Result<()> = db.transaction(|store| {
            store.allocate_id();
            store.allocate_id();
            Err(Error::parameter("boom"))
        });
        assert!(result.is_err());
        // The id sequence was restored along with everything else.
        assert_eq!(db.write().allocate_id(), 1);
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let db = Database::new();
        let id = db.transaction(|store| Ok(store.allocate_id())).unwrap();
        assert_eq!(id, 1);
        assert_eq!(db.write().allocate_id(), 2);
    }
}

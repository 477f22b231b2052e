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

//! Per-process worker pool bridging synchronous scheduler callbacks into
//! async engine code.
//!
//! One long-lived runtime runs on a dedicated daemon thread named
//! `worker-async-loop`, created lazily on first use. [`WorkerPool::run`]
//! submits a future from any synchronous caller and blocks until it
//! completes; a panicking task surfaces as a scheduler error on the
//! caller instead of killing the loop.
//!
//! The repository handle used by scheduler tasks is bound once per
//! process ([`bind_repository`]) behind an init mutex, and every
//! init-then-use pair is composed inside a single submitted future so
//! binding and use share the loop. After a process fork the child must
//! call [`reset_process_state`]: the loop thread does not survive the
//! fork, and a child reusing the parent's pool or repository binding
//! would submit work to a loop nobody drives.

use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::dal::DAL;
use crate::database::Database;
use crate::error::{Error, Result};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to the dedicated worker loop.
pub struct WorkerPool {
    sender: tokio::sync::mpsc::UnboundedSender<Job>,
}

impl WorkerPool {
    fn start() -> Result<Self> {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<Job>();
        thread::Builder::new()
            .name("worker-async-loop".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!(%err, "failed to build the worker loop runtime");
                        return;
                    }
                };
                runtime.block_on(async move {
                    while let Some(job) = receiver.recv().await {
                        // Spawn each job so a panic is contained in the
                        // task instead of tearing the loop down.
                        if let Err(err) = tokio::spawn(job).await {
                            warn!(%err, "worker loop job did not finish cleanly");
                        }
                    }
                });
                debug!("worker loop drained and stopped");
            })
            .map_err(|e| Error::scheduler(format!("failed to spawn the worker loop thread: {e}")))?;
        Ok(WorkerPool { sender })
    }

    /// Submits a future to the loop and blocks the calling thread until
    /// it completes, returning its output. Errors cover a dead loop and
    /// a panicked task.
    pub fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: Job = Box::pin(async move {
            let output = future.await;
            let _ = tx.send(output);
        });
        self.sender
            .send(job)
            .map_err(|_| Error::scheduler("worker loop is gone, cannot submit"))?;
        rx.recv().map_err(|_| {
            Error::scheduler("worker loop task ended without a result (it may have panicked)")
        })
    }
}

static WORKER_POOL: Lazy<RwLock<Option<Arc<WorkerPool>>>> = Lazy::new(|| RwLock::new(None));
static REPOSITORY: Lazy<RwLock<Option<DAL>>> = Lazy::new(|| RwLock::new(None));
static REPOSITORY_INIT: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// The process-wide pool, created lazily on first use.
pub fn global_worker_pool() -> Result<Arc<WorkerPool>> {
    if let Some(pool) = WORKER_POOL.read().as_ref() {
        return Ok(Arc::clone(pool));
    }
    let mut guard = WORKER_POOL.write();
    if let Some(pool) = guard.as_ref() {
        return Ok(Arc::clone(pool));
    }
    let pool = Arc::new(WorkerPool::start()?);
    *guard = Some(Arc::clone(&pool));
    debug!("worker loop started");
    Ok(pool)
}

/// Binds the scheduler's repository handle once per process. Subsequent
/// calls return the existing handle regardless of the database passed
/// in; callers compose this with their first use inside one submitted
/// future.
pub fn bind_repository(database: &Database) -> DAL {
    let _init = REPOSITORY_INIT.lock();
    if let Some(dal) = REPOSITORY.read().as_ref() {
        return dal.clone();
    }
    let dal = DAL::new(database.clone());
    *REPOSITORY.write() = Some(dal.clone());
    debug!("scheduler repository bound");
    dal
}

/// Clears the pool singleton and the repository binding. Must be called
/// in a forked child before any scheduler work.
pub fn reset_process_state() {
    *WORKER_POOL.write() = None;
    *REPOSITORY.write() = None;
    debug!("worker pool process state reset");
}

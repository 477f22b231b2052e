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

//! Task scheduling: the per-process worker pool bridging sync scheduler
//! callbacks into async engine code, the execution-record lifecycle, and
//! the periodic scan-and-dispatch sweep.

pub mod pool;
pub mod records;
pub mod scan;

pub use pool::{bind_repository, global_worker_pool, reset_process_state, WorkerPool};
pub use records::DispatchIdentity;
pub use scan::{is_due, TaskScheduler};

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

//! The step execution engine.
//!
//! - [`placeholder`] / [`generators`]: `${...}` resolution and the
//!   fake-data catalog behind `${func(...)}`.
//! - [`context`]: the per-case execution context (variable pools, step
//!   transcripts, HTTP client, cycle index).
//! - [`script`]: the restricted evaluator behind scripted steps.
//! - [`extract`] / [`compare`]: the extract/assert pipeline.
//! - [`steps`]: one executor per step type behind a uniform wrapper.
//! - [`orchestrator`]: the case-level engine tying it all together.

pub mod compare;
pub mod context;
pub mod extract;
pub mod generators;
pub mod http;
pub mod orchestrator;
pub mod placeholder;
pub mod script;
pub mod steps;

pub use context::{ExecutionContext, Scope};
pub use generators::{call_generator, list_generators, GeneratorInfo};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient, TransportError};
pub use orchestrator::{EngineRun, ExecutionEngine, RunStatistics};
pub use steps::{AssertOutcome, ExtractOutcome, ResponseEcho, StepOutcome};

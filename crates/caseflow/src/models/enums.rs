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

//! Closed enumerations shared across the data model and the engine.
//!
//! The serde renames are the wire values; they match what step
//! configurations and persisted rows carry.

use serde::{Deserialize, Serialize};

/// Discriminator for one node of a case's execution tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "PYTHON")]
    Python,
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "DATABASE")]
    Database,
    #[serde(rename = "LOOP")]
    Loop,
    #[serde(rename = "IF")]
    If,
    #[serde(rename = "WAIT")]
    Wait,
    #[serde(rename = "QUOTE")]
    Quote,
    #[serde(rename = "USER_VARIABLES")]
    UserVariables,
}

impl StepType {
    /// Only loop and branch nodes may own children.
    pub fn allows_children(self) -> bool {
        matches!(self, StepType::Loop | StepType::If)
    }
}

/// Role of a case: private cases run standalone, public-script cases are
/// the targets of quote steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseType {
    #[serde(rename = "PRIVATE_SCRIPT")]
    PrivateScript,
    #[serde(rename = "PUBLIC_SCRIPT")]
    PublicScript,
}

/// How a report came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportType {
    #[serde(rename = "SYNC_EXEC")]
    SyncExec,
    #[serde(rename = "ASYNC_EXEC")]
    AsyncExec,
    #[serde(rename = "DEBUG_EXEC")]
    DebugExec,
}

/// Loop step iteration modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopMode {
    #[serde(rename = "COUNT")]
    Count,
    #[serde(rename = "ITERABLE")]
    Iterable,
    #[serde(rename = "DICT")]
    Dict,
    #[serde(rename = "CONDITION")]
    Condition,
}

/// What a loop does when a child fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopErrorStrategy {
    /// Note the failure and move on to the next iteration.
    #[serde(rename = "CONTINUE")]
    Continue,
    /// Terminate this loop cleanly.
    #[serde(rename = "BREAK")]
    Break,
    /// Propagate upward, aborting the whole case.
    #[serde(rename = "STOP")]
    Stop,
}

/// Which of the configured request payloads an HTTP step actually sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestArgsType {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "params")]
    Params,
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "form-data")]
    FormData,
    #[serde(rename = "x-www-form-urlencoded")]
    XWwwFormUrlencoded,
}

/// Lifecycle state of one dispatched execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILURE")]
    Failure,
}

/// Kind of schedule a task carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskScheduler {
    #[serde(rename = "cron")]
    Cron,
    #[serde(rename = "interval")]
    Interval,
    #[serde(rename = "datetime")]
    Datetime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_type_wire_values() {
        let json = serde_json::to_string(&StepType::UserVariables).unwrap();
        assert_eq!(json, "\"USER_VARIABLES\"");
        let back: StepType = serde_json::from_str("\"LOOP\"").unwrap();
        assert_eq!(back, StepType::Loop);
    }

    #[test]
    fn test_only_loop_and_if_allow_children() {
        assert!(StepType::Loop.allows_children());
        assert!(StepType::If.allows_children());
        assert!(!StepType::Http.allows_children());
        assert!(!StepType::Quote.allows_children());
    }

    #[test]
    fn test_request_args_type_wire_values() {
        let v: RequestArgsType = serde_json::from_str("\"x-www-form-urlencoded\"").unwrap();
        assert_eq!(v, RequestArgsType::XWwwFormUrlencoded);
    }
}

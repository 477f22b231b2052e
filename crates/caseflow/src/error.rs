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

//! Error types for the caseflow engine.
//!
//! Three kinds drive the engine proper:
//! - [`Error::Parameter`] — schema violations and missing required
//!   configuration, surfaced at the API boundary.
//! - [`Error::NotFound`] — dangling references (case, environment, task).
//! - [`StepError`] — anything that goes wrong while executing one step:
//!   transport failures, parse failures, failed assertions, script errors.
//!   Captured per step; loop error strategies govern propagation.
//!
//! [`Error::Conflict`] and [`Error::Scheduler`] cover the repository and
//! worker-pool layers respectively.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for repository, runner and scheduler operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Schema violation or missing required configuration.
    #[error("parameter error: {message}")]
    Parameter { message: String },

    /// A referenced entity does not exist (or is soft-deleted).
    #[error("{entity} not found: {detail}")]
    NotFound { entity: &'static str, detail: String },

    /// A uniqueness or ownership constraint would be violated.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// A step failed during execution.
    #[error(transparent)]
    Step(#[from] StepError),

    /// The worker pool or dispatch machinery failed.
    #[error("scheduler error: {message}")]
    Scheduler { message: String },
}

impl Error {
    pub fn parameter(message: impl Into<String>) -> Self {
        Error::Parameter {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, detail: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            detail: detail.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict {
            message: message.into(),
        }
    }

    pub fn scheduler(message: impl Into<String>) -> Self {
        Error::Scheduler {
            message: message.into(),
        }
    }
}

/// Classification of a step-execution failure.
///
/// Transport errors keep their `network`/`timeout` distinction so the step
/// transcript can say why a request never produced a response; everything
/// else folds into the coarser buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepErrorKind {
    /// Connection-level failure (DNS, refused, reset).
    Network,
    /// The transport timed out before a response arrived.
    Timeout,
    /// Invalid or missing step configuration.
    Parameter,
    /// One or more assertions did not pass.
    Assertion,
    /// The scripted-code evaluator rejected or failed the script.
    Script,
    /// Anything else.
    Unknown,
}

/// The single error shape produced while executing one step.
///
/// All step bodies translate their failures into this; the uniform
/// execute wrapper records it on the step result and keeps going.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        StepError {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Timeout, message)
    }

    pub fn parameter(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Parameter, message)
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Assertion, message)
    }

    pub fn script(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Script, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Unknown, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_display_is_message_only() {
        let err = StepError::timeout("no response within 30s");
        assert_eq!(err.to_string(), "no response within 30s");
        assert_eq!(err.kind, StepErrorKind::Timeout);
    }

    #[test]
    fn test_step_error_converts_into_error() {
        let err: Error = StepError::assertion("2 assertions failed").into();
        assert!(matches!(err, Error::Step(_)));
    }
}

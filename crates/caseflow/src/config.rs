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

//! Configuration parameters for the execution engine and the scheduler.

use std::time::Duration;

/// Tunables for one engine invocation.
///
/// The defaults mirror the platform's fixed limits: a 30 second total HTTP
/// timeout with a 10 second connect budget, a 300 second ceiling on wait
/// steps, and a hard 100-iteration guard on COUNT/CONDITION loops.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Total per-request HTTP timeout.
    pub http_timeout: Duration,
    /// HTTP connect timeout.
    pub http_connect_timeout: Duration,
    /// Upper bound accepted by wait steps and loop intervals, in seconds.
    pub max_sleep_seconds: f64,
    /// Hard iteration cap for COUNT and CONDITION loops.
    pub loop_guard_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            http_timeout: Duration::from_secs(30),
            http_connect_timeout: Duration::from_secs(10),
            max_sleep_seconds: 300.0,
            loop_guard_limit: 100,
        }
    }
}

/// Tunables for the scheduler scan loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the scan sweeps the task table.
    pub scan_interval: Duration,
    /// Discriminator isolating engine tasks from unrelated schedules
    /// sharing the queue.
    pub task_type: String,
    /// Node identifier stamped into execution records.
    pub node_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            scan_interval: Duration::from_secs(30),
            task_type: "autotest".to_string(),
            node_name: "caseflow-worker".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.http_connect_timeout, Duration::from_secs(10));
        assert_eq!(config.loop_guard_limit, 100);
    }

    #[test]
    fn test_scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(30));
        assert_eq!(config.task_type, "autotest");
    }
}

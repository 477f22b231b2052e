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

//! Per-case execution context.
//!
//! One context lives for exactly one case run. It owns the HTTP client,
//! the two variable pools (`defined_variables`, rewritten at every step;
//! `session_variables`, the persistent pool), the per-step transcript
//! buffers keyed by step code, the loop cycle index, and — in
//! deferred-save mode — the append-only buffer of detail payloads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::dal::DAL;
use crate::engine::http::{HttpClient, HttpRequest, HttpResponse};
use crate::engine::{placeholder, script};
use crate::error::StepError;
use crate::models::variable::{self, VariableItem};
use crate::models::NewDetail;

/// Which pool an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The step-scoped pool, replaced at every step entry.
    Defined,
    /// The case-scoped pool, accumulated across steps.
    Session,
}

/// Execution context for one case run.
pub struct ExecutionContext {
    pub case_id: i64,
    pub case_code: String,
    pub env_name: Option<String>,
    pub report_code: Option<String>,
    pub defined_variables: Vec<VariableItem>,
    pub session_variables: Vec<VariableItem>,
    /// Step transcripts, keyed by step code.
    pub logs: BTreeMap<String, Vec<String>>,
    /// Current loop iteration per step code, 1-based.
    pub step_cycle_index: HashMap<String, u32>,
    current_step_code: Option<String>,
    /// Deferred-save buffer; `Some` means details are collected instead
    /// of written.
    pub pending_details: Option<Vec<NewDetail>>,
    http: Arc<dyn HttpClient>,
    pub(crate) dal: DAL,
    pub config: EngineConfig,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        case_id: i64,
        case_code: impl Into<String>,
        env_name: Option<String>,
        initial_variables: Vec<VariableItem>,
        report_code: Option<String>,
        defer_details: bool,
        http: Arc<dyn HttpClient>,
        dal: DAL,
        config: EngineConfig,
    ) -> Self {
        let mut context = ExecutionContext {
            case_id,
            case_code: case_code.into(),
            env_name,
            report_code,
            defined_variables: Vec::new(),
            session_variables: Vec::new(),
            logs: BTreeMap::new(),
            step_cycle_index: HashMap::new(),
            current_step_code: None,
            pending_details: defer_details.then(Vec::new),
            http,
            dal,
            config,
        };
        // Initial variables may themselves carry placeholders.
        context.session_variables = context.resolve_variable_items(&initial_variables);
        context
    }

    pub fn current_step_code(&self) -> Option<&str> {
        self.current_step_code.as_deref()
    }

    pub fn set_current_step_code(&mut self, step_code: Option<String>) {
        self.current_step_code = step_code;
    }

    /// Appends a timestamped line to a step's transcript; without an
    /// explicit step code the current step receives it.
    pub fn log(&mut self, message: impl AsRef<str>) {
        self.log_for(None, message);
    }

    pub fn log_for(&mut self, step_code: Option<&str>, message: impl AsRef<str>) {
        let key = step_code
            .map(str::to_string)
            .or_else(|| self.current_step_code.clone())
            .unwrap_or_default();
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        self.logs
            .entry(key)
            .or_default()
            .push(format!("[{timestamp}] {}", message.as_ref()));
    }

    /// Reads a variable, `defined_variables` first, then
    /// `session_variables`. Null bindings are treated as absent.
    pub fn get_variable(&self, name: &str) -> Result<Value, StepError> {
        if name.is_empty() {
            return Err(StepError::parameter(
                "variable name must be a non-empty string",
            ));
        }
        for pool in [&self.defined_variables, &self.session_variables] {
            if let Some(value) = variable::value_from_list(pool, name) {
                if !value.is_null() {
                    return Ok(value.clone());
                }
            }
        }
        Err(StepError::parameter(format!(
            "variable ({name}) is not defined; check the name or define it in an earlier step"
        )))
    }

    /// Upserts bindings into the chosen pool: same key overwrites in
    /// place, new keys append.
    pub fn update_variables(&mut self, items: Vec<VariableItem>, scope: Scope) {
        let keys: Vec<&str> = items.iter().map(|item| item.key.as_str()).collect();
        let message = format!("variables updated ({scope:?}): {keys:?}");
        let target = match scope {
            Scope::Defined => &mut self.defined_variables,
            Scope::Session => &mut self.session_variables,
        };
        variable::upsert_into(target, items);
        self.log(message);
    }

    /// Recursive placeholder resolution over a JSON value; resolution
    /// notes land in the current step's transcript.
    pub fn resolve_placeholders(&mut self, value: &Value) -> Value {
        let mut notes = Vec::new();
        let resolved = {
            let lookup = |name: &str| self.get_variable(name).ok();
            placeholder::resolve_value(value, &lookup, &mut notes)
        };
        for note in notes {
            self.log(note);
        }
        resolved
    }

    /// Resolves the `value` of each `{key, value, desc}` binding.
    pub fn resolve_variable_items(&mut self, items: &[VariableItem]) -> Vec<VariableItem> {
        let mut notes = Vec::new();
        let resolved = {
            let lookup = |name: &str| self.get_variable(name).ok();
            items
                .iter()
                .map(|item| VariableItem {
                    key: item.key.clone(),
                    value: placeholder::resolve_value(&item.value, &lookup, &mut notes),
                    desc: item.desc.clone(),
                })
                .collect()
        };
        for note in notes {
            self.log(note);
        }
        resolved
    }

    /// Resolves a single string with the bare pass.
    pub fn resolve_string(&mut self, input: &str) -> String {
        let mut notes = Vec::new();
        let resolved = {
            let lookup = |name: &str| self.get_variable(name).ok();
            placeholder::resolve_string(input, &lookup, &mut notes)
        };
        for note in notes {
            self.log(note);
        }
        resolved
    }

    /// Cooperative wait. Rejects non-finite or negative durations and
    /// anything above the configured ceiling.
    pub async fn sleep(&mut self, seconds: f64) -> Result<(), StepError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(StepError::parameter(format!(
                "wait seconds must be a non-negative number, got: {seconds}"
            )));
        }
        if seconds > self.config.max_sleep_seconds {
            return Err(StepError::parameter(format!(
                "wait seconds must not exceed {}, got: {seconds}",
                self.config.max_sleep_seconds
            )));
        }
        if seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }
        self.log(format!("waited {seconds} seconds"));
        Ok(())
    }

    /// Sends a request through the context's client, logging the request
    /// shape and the response line; transport failures classify into the
    /// step error.
    pub async fn send_http_request(
        &mut self,
        request: HttpRequest,
    ) -> Result<HttpResponse, StepError> {
        self.log(format!("http request method: {}", request.method));
        self.log(format!("http request url: {}", request.url));
        if !request.headers.is_empty() {
            self.log(format!("http request headers: {:?}", request.headers));
        }
        if !request.params.is_empty() {
            self.log(format!("http request params: {:?}", request.params));
        }
        match self.http.request(request).await {
            Ok(response) => {
                self.log(format!(
                    "http request succeeded: status {}, elapsed {:.6}s",
                    response.status_code, response.elapsed
                ));
                Ok(response)
            }
            Err(err) => {
                let step_error: StepError = err.into();
                self.log(&step_error.message);
                Err(step_error)
            }
        }
    }

    /// Namespace handed to scripted steps: the two pools flattened to
    /// `name -> value` maps. A one-shot copy; script mutations do not
    /// feed back, only the result does.
    pub fn script_namespace(&self) -> BTreeMap<String, Value> {
        let defined: Map<String, Value> = variable::list_to_map(&self.defined_variables)
            .into_iter()
            .collect();
        let session: Map<String, Value> = variable::list_to_map(&self.session_variables)
            .into_iter()
            .collect();
        BTreeMap::from([
            ("defined_variables".to_string(), Value::Object(defined)),
            ("session_variables".to_string(), Value::Object(session)),
        ])
    }

    /// Resolves code-aware placeholders and evaluates the script.
    pub fn run_script_code(&mut self, code: &str) -> Result<Map<String, Value>, StepError> {
        if code.trim().is_empty() {
            return Ok(Map::new());
        }
        let mut notes = Vec::new();
        let resolved = {
            let lookup = |name: &str| self.get_variable(name).ok();
            placeholder::resolve_code(code, &lookup, &mut notes)
        };
        for note in notes {
            self.log(note);
        }
        let result = script::run_script(&resolved, &self.script_namespace());
        match &result {
            Ok(map) if map.is_empty() => self.log("script finished with no result"),
            Ok(map) => {
                let keys: Vec<&String> = map.keys().collect();
                self.log(format!("script finished, result keys: {keys:?}"));
            }
            Err(err) => self.log(&err.message),
        }
        result
    }

    /// Buffers or writes one detail payload depending on the save mode.
    pub async fn save_detail(&mut self, detail: NewDetail) -> Result<(), StepError> {
        if let Some(pending) = self.pending_details.as_mut() {
            pending.push(detail);
            return Ok(());
        }
        self.dal
            .details()
            .create(detail)
            .await
            .map(|_| ())
            .map_err(|e| StepError::unknown(format!("failed to save the step detail: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::engine::http::TransportError;
    use async_trait::async_trait;
    use serde_json::json;

    struct NoopClient;

    #[async_trait]
    impl HttpClient for NoopClient {
        async fn request(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Network("unused".into()))
        }
    }

    fn context(initial: Vec<VariableItem>) -> ExecutionContext {
        ExecutionContext::new(
            1,
            "case-code",
            None,
            initial,
            None,
            false,
            Arc::new(NoopClient),
            DAL::new(Database::new()),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_defined_shadows_session() {
        let mut ctx = context(vec![VariableItem::new("k", json!("session"))]);
        ctx.defined_variables = vec![VariableItem::new("k", json!("defined"))];
        assert_eq!(ctx.get_variable("k").unwrap(), json!("defined"));
        ctx.defined_variables.clear();
        assert_eq!(ctx.get_variable("k").unwrap(), json!("session"));
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let ctx = context(Vec::new());
        assert!(ctx.get_variable("missing").is_err());
        assert!(ctx.get_variable("").is_err());
    }

    #[test]
    fn test_null_bindings_are_treated_as_absent() {
        let ctx = context(vec![VariableItem::new("k", Value::Null)]);
        assert!(ctx.get_variable("k").is_err());
    }

    #[test]
    fn test_session_updates_are_monotonic() {
        let mut ctx = context(Vec::new());
        ctx.update_variables(vec![VariableItem::new("k", json!("v1"))], Scope::Session);
        ctx.update_variables(vec![VariableItem::new("k", json!("v2"))], Scope::Session);
        assert_eq!(ctx.get_variable("k").unwrap(), json!("v2"));
        assert_eq!(ctx.session_variables.len(), 1);
    }

    #[test]
    fn test_initial_variables_resolve_function_placeholders() {
        let ctx = context(vec![
            VariableItem::new("id", json!("${generate_string(length=4, digit=True)}")),
            VariableItem::new("later", json!("${not_yet_defined}")),
        ]);
        // Function placeholders resolve during setup; variable references
        // have no pool to read yet and stay literal.
        assert_eq!(ctx.get_variable("id").unwrap().as_str().map(str::len), Some(4));
        assert_eq!(ctx.get_variable("later").unwrap(), json!("${not_yet_defined}"));
    }

    #[tokio::test]
    async fn test_sleep_rejects_out_of_range() {
        let mut ctx = context(Vec::new());
        assert!(ctx.sleep(-1.0).await.is_err());
        assert!(ctx.sleep(f64::NAN).await.is_err());
        assert!(ctx.sleep(301.0).await.is_err());
        assert!(ctx.sleep(0.0).await.is_ok());
    }

    #[test]
    fn test_logs_attach_to_current_step() {
        let mut ctx = context(Vec::new());
        ctx.set_current_step_code(Some("step-1".into()));
        ctx.log("hello");
        assert_eq!(ctx.logs.get("step-1").map(Vec::len), Some(1));
        assert!(ctx.logs["step-1"][0].contains("hello"));
    }
}

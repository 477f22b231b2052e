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

//! HTTP transport abstraction.
//!
//! The engine talks to [`HttpClient`], not to a concrete client, so tests
//! inject fixture transports and the execution context owns exactly one
//! client per case run. [`ReqwestClient`] is the production
//! implementation; transport failures classify into timeout / network /
//! unknown before they reach a step result.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::error::StepError;

/// One outbound request as assembled by the HTTP step executor.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub body: HttpBody,
    /// Per-request override of the client default.
    pub timeout: Option<Duration>,
}

/// The request body variants an HTTP step can produce.
#[derive(Debug, Clone, Default)]
pub enum HttpBody {
    #[default]
    Empty,
    /// Raw text payload.
    Raw(String),
    /// JSON payload.
    Json(Value),
    /// `application/x-www-form-urlencoded` fields.
    Form(BTreeMap<String, String>),
    /// Multipart form fields plus file parts.
    Multipart {
        fields: BTreeMap<String, String>,
        files: BTreeMap<String, String>,
    },
}

/// The response facet the engine consumes.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub text: String,
    pub cookies: BTreeMap<String, String>,
    /// Seconds spent on the wire.
    pub elapsed: f64,
}

/// Transport-level failure, classified before it reaches a step result.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No response arrived within the configured window.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Connection-level failure (DNS, refused, reset).
    #[error("network error: {0}")]
    Network(String),
    /// Anything else.
    #[error("transport error: {0}")]
    Unknown(String),
}

impl From<TransportError> for StepError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => StepError::timeout(format!(
                "http request timed out before the server responded \
                 (network latency, a slow server, or a short timeout): {msg}"
            )),
            TransportError::Network(msg) => StepError::network(format!(
                "http request failed with a network error \
                 (connectivity, DNS resolution, or an unreachable server): {msg}"
            )),
            TransportError::Unknown(msg) => {
                StepError::unknown(format!("http request failed unexpectedly: {msg}"))
            }
        }
    }
}

/// Client seam used by the execution context.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production client backed by `reqwest`.
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client with the context's timeout budget.
    pub fn new(config: &EngineConfig) -> Result<Self, StepError> {
        let inner = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.http_connect_timeout)
            .build()
            .map_err(|e| StepError::unknown(format!("failed to build the http client: {e}")))?;
        Ok(ReqwestClient { inner })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        TransportError::Network(err.to_string())
    } else {
        TransportError::Unknown(err.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method: reqwest::Method = request
            .method
            .parse()
            .map_err(|_| TransportError::Unknown(format!("invalid method: {}", request.method)))?;
        let mut builder = self.inner.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        builder = match request.body {
            HttpBody::Empty => builder,
            HttpBody::Raw(text) => builder.body(text),
            HttpBody::Json(value) => builder.json(&value),
            HttpBody::Form(fields) => builder.form(&fields),
            HttpBody::Multipart { fields, files } => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for (name, value) in files {
                    form = form.text(name, value);
                }
                builder.multipart(form)
            }
        };
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(classify)?;
        let status_code = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            headers.insert(
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            );
        }
        let mut cookies = BTreeMap::new();
        for value in response.headers().get_all(reqwest::header::SET_COOKIE) {
            if let Ok(raw) = value.to_str() {
                if let Some((name, rest)) = raw.split_once('=') {
                    let cookie_value = rest.split(';').next().unwrap_or_default();
                    cookies.insert(name.trim().to_string(), cookie_value.trim().to_string());
                }
            }
        }
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Unknown(format!("failed to read the body: {e}")))?;
        Ok(HttpResponse {
            status_code,
            headers,
            text,
            cookies,
            elapsed: started.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_map_to_step_error_kinds() {
        use crate::error::StepErrorKind;
        let timeout: StepError = TransportError::Timeout("30s".into()).into();
        assert_eq!(timeout.kind, StepErrorKind::Timeout);
        let network: StepError = TransportError::Network("refused".into()).into();
        assert_eq!(network.kind, StepErrorKind::Network);
        let unknown: StepError = TransportError::Unknown("odd".into()).into();
        assert_eq!(unknown.kind, StepErrorKind::Unknown);
    }

    #[test]
    fn test_reqwest_client_builds_with_defaults() {
        let config = EngineConfig::default();
        assert!(ReqwestClient::new(&config).is_ok());
    }
}

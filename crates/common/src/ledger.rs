//! Request/response ledger shared by every emulator.
//!
//! The ledger has two halves:
//! - an append-only log of inbound [`MockRequest`]s, read by scenarios for
//!   assertions
//! - a table of canned [`MockResponse`]s keyed by `"METHOD path"`, consulted
//!   by an emulator as a fallback route when none of its built-in handlers
//!   match

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::Error;

/// An inbound request as seen by an emulator. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockRequest {
    pub method: String,
    /// Request path without the query string
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl MockRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decode the body as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

/// A configurable canned response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Per-request delay applied when the response is served.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn new(status_code: u16, body: serde_json::Value) -> Self {
        Self {
            status_code,
            body,
            headers: Vec::new(),
            delay: None,
        }
    }

    /// 200 with a JSON body
    pub fn json(body: serde_json::Value) -> Self {
        Self::new(200, body)
    }

    /// Generic error-shaped response: `{"error": message}`
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(status_code, serde_json::json!({ "error": message.into() }))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.body)).into_response();
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => debug!("skipping invalid canned header {}", name),
            }
        }
        response
    }
}

/// Render an emulator error in the generic `{"error": message}` shape.
impl From<Error> for MockResponse {
    fn from(err: Error) -> Self {
        let status = err.status_code().as_u16();
        let message = match err {
            Error::Configured { message, .. } => message,
            other => other.to_string(),
        };
        MockResponse::error(status, message)
    }
}

/// Key under which a canned response is registered.
pub fn response_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path)
}

/// Request log plus canned-response table.
#[derive(Debug, Default)]
pub struct RequestLedger {
    requests: Mutex<Vec<MockRequest>>,
    responses: Mutex<HashMap<String, MockResponse>>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request to the log
    pub fn record(&self, request: MockRequest) {
        debug!("recorded {} {}", request.method, request.path);
        self.requests.lock().push(request);
    }

    /// Snapshot of every recorded request, oldest first
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_for_path(&self, path: &str) -> Vec<MockRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn requests_matching(&self, method: &str, path: &str) -> Vec<MockRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path && r.method.eq_ignore_ascii_case(method))
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<MockRequest> {
        self.requests.lock().last().cloned()
    }

    /// Register or overwrite the canned response for `METHOD path`
    pub fn set_response(&self, method: &str, path: &str, response: MockResponse) {
        let key = response_key(method, path);
        debug!("canned response for {} -> {}", key, response.status_code);
        self.responses.lock().insert(key, response);
    }

    pub fn response_for(&self, method: &str, path: &str) -> Option<MockResponse> {
        self.responses.lock().get(&response_key(method, path)).cloned()
    }

    /// Clear both the request log and the canned responses
    pub fn reset(&self) {
        self.requests.lock().clear();
        self.responses.lock().clear();
    }
}

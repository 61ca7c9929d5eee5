//! Generic PM tool emulator
//!
//! Covers several PM backends behind one listener, plus arbitrary response,
//! error and latency injection for any path.
//!
//! Built-in routes (explicit method + path switch):
//!
//! | Route                         | Tool | Auth                |
//! |-------------------------------|------|---------------------|
//! | `GET /rest/api/2/myself`      | JIRA | Basic or Bearer     |
//! | `GET /rest/api/2/search`      | JIRA | none                |
//! | `POST /rest/api/2/issue`      | JIRA | Basic               |
//! | `GET /api/v1/features`        | Aha! | Bearer              |
//!
//! Everything else is looked up in the canned-response table, then 404.
//!
//! Search results and features are synthesized from their index in a fixed
//! virtual universe, so repeated requests always see identical records.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use fern_common::{Error, MockResponse, RequestLedger};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::auth::{credentials, Credentials};
use crate::jira::{jira_error, user_record};
use crate::server::{canned_response, Emulator};

const STATUSES: [&str; 4] = ["To Do", "In Progress", "In Review", "Done"];
const ISSUE_TYPES: [&str; 3] = ["Story", "Bug", "Task"];
const PRIORITIES: [&str; 5] = ["Highest", "High", "Medium", "Low", "Lowest"];
const ASSIGNEES: [Option<&str>; 4] = [Some("alice"), Some("bob"), Some("carol"), None];
const FIX_VERSIONS: [&str; 3] = ["1.0", "1.1", "2.0"];
const TEAMS: [&str; 3] = ["Platform", "Mobile", "Web"];

const FEATURE_STATUSES: [&str; 4] = ["New", "In development", "Ready to ship", "Shipped"];
const RELEASES: [&str; 3] = ["R1 2024", "R2 2024", "R3 2024"];

/// 2024-01-01T00:00:00Z; synthetic timestamps count days from here
const EPOCH_BASE: i64 = 1_704_067_200;

const DEFAULT_PROJECT: &str = "TEST";
const DEFAULT_MAX_RESULTS: usize = 50;
const DEFAULT_PER_PAGE: usize = 30;

static PROJECT_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)project\s*=\s*"?([A-Za-z][A-Za-z0-9_]*)"?"#).expect("valid project regex")
});

/// Generic emulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PmToolConfig {
    pub enabled: bool,
    pub port: u16,
    /// Size of the virtual JIRA issue universe
    pub issue_universe: usize,
    /// Size of the virtual Aha! feature universe
    pub feature_universe: usize,
}

impl Default for PmToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 0,
            issue_universe: 100,
            feature_universe: 20,
        }
    }
}

/// Generic PM tool emulator
#[derive(Clone)]
pub struct PmToolEmulator {
    state: Arc<PmToolState>,
}

struct PmToolState {
    ledger: Arc<RequestLedger>,
    config: PmToolConfig,
    /// Keys handed out by issue creation, in order
    created: Mutex<Vec<String>>,
}

impl PmToolEmulator {
    pub fn new(config: PmToolConfig) -> Self {
        Self {
            state: Arc::new(PmToolState {
                ledger: Arc::new(RequestLedger::new()),
                config,
                created: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register or override the response for `METHOD path`
    pub fn set_response(&self, method: &str, path: &str, response: MockResponse) {
        info!("pm-tool: canned response for {} {}", method, path);
        self.state.ledger.set_response(method, path, response);
    }

    /// Register an error-shaped response: `{"error": message}`
    pub fn simulate_error(&self, method: &str, path: &str, status_code: u16, message: &str) {
        let err = Error::Configured {
            status: status_code,
            message: message.to_string(),
        };
        self.set_response(method, path, MockResponse::from(err));
    }

    /// Register a "delayed" response for `METHOD path`.
    ///
    /// The delay is spent here, while the response is being configured, not
    /// when a request later arrives: the call itself takes `delay` to return
    /// and the registered response is served immediately afterwards. Use
    /// [`PmToolEmulator::simulate_latency`] for a delay on every request.
    pub async fn simulate_timeout(&self, method: &str, path: &str, delay: Duration) {
        let response = {
            tokio::time::sleep(delay).await;
            MockResponse::json(json!({ "status": "delayed", "delayMs": delay.as_millis() as u64 }))
        };
        self.set_response(method, path, response);
    }

    /// Register `response` for `METHOD path`, delayed by `delay` on every
    /// matching request.
    pub fn simulate_latency(&self, method: &str, path: &str, delay: Duration, response: MockResponse) {
        self.set_response(method, path, response.with_delay(delay));
    }

    pub fn requests(&self) -> Vec<fern_common::MockRequest> {
        self.state.ledger.requests()
    }

    pub fn requests_for_path(&self, path: &str) -> Vec<fern_common::MockRequest> {
        self.state.ledger.requests_for_path(path)
    }

    /// Keys returned by `POST /rest/api/2/issue`, oldest first
    pub fn created_issues(&self) -> Vec<String> {
        self.state.created.lock().clone()
    }
}

impl Default for PmToolEmulator {
    fn default() -> Self {
        Self::new(PmToolConfig::default())
    }
}

impl Emulator for PmToolEmulator {
    fn name(&self) -> &'static str {
        "pm-tool"
    }

    fn routes(&self) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(self.state.clone())
    }

    fn ledger(&self) -> &Arc<RequestLedger> {
        &self.state.ledger
    }

    fn reset(&self) {
        info!("pm-tool: reset");
        self.state.ledger.reset();
        self.state.created.lock().clear();
    }
}

async fn dispatch(
    State(state): State<Arc<PmToolState>>,
    method: Method,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match (method.as_str(), uri.path()) {
        ("GET", "/rest/api/2/myself") => jira_myself(&headers),
        ("GET", "/rest/api/2/search") => Json(jira_search(&state.config, &params)).into_response(),
        ("POST", "/rest/api/2/issue") => jira_create_issue(&state, &headers, &body),
        ("GET", "/api/v1/features") => aha_features(&state.config, &headers, &params),
        (_, path) => match canned_response(&state.ledger, &method, path).await {
            Some(resp) => resp,
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Not found", "path": path })),
            )
                .into_response(),
        },
    }
}

fn jira_myself(headers: &HeaderMap) -> Response {
    match credentials(headers) {
        Some(Credentials::Basic { username }) => Json(user_record(&username)).into_response(),
        Some(Credentials::Bearer(_)) => Json(user_record("")).into_response(),
        None => jira_error(StatusCode::UNAUTHORIZED, "Unauthorized"),
    }
}

fn param<T: std::str::FromStr>(params: &HashMap<String, String>, name: &str) -> Option<T> {
    params.get(name).and_then(|v| v.trim().parse().ok())
}

/// Project key named by a `project = KEY` clause, if any
pub fn jql_project(jql: &str) -> Option<String> {
    PROJECT_CLAUSE
        .captures(jql)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}

fn synthetic_timestamp(index: usize) -> Option<String> {
    chrono::DateTime::from_timestamp(EPOCH_BASE + index as i64 * 86_400, 0).map(|t| t.to_rfc3339())
}

/// Issue at `index` in the virtual universe. Every field is a pure function
/// of the index.
pub fn synthetic_issue(project: &str, index: usize) -> Value {
    let number = index + 1;
    let assignee = ASSIGNEES[index % ASSIGNEES.len()].map(|name| {
        json!({
            "accountId": format!("acc-{}", name),
            "name": name,
            "displayName": name,
            "emailAddress": format!("{}@example.com", name)
        })
    });

    json!({
        "id": (10000 + number).to_string(),
        "key": format!("{}-{}", project, number),
        "fields": {
            "summary": format!("Synthetic issue {}", number),
            "description": format!("Generated requirement #{} for acceptance testing", number),
            "status": { "name": STATUSES[index % STATUSES.len()] },
            "issuetype": { "name": ISSUE_TYPES[index % ISSUE_TYPES.len()] },
            "priority": { "name": PRIORITIES[index % PRIORITIES.len()] },
            "assignee": assignee,
            "fixVersions": [{ "name": FIX_VERSIONS[index % FIX_VERSIONS.len()] }],
            "customfield_10001": { "value": TEAMS[index % TEAMS.len()] },
            "customfield_10002": (index % 8) + 1,
            "created": synthetic_timestamp(index),
            "updated": synthetic_timestamp(index + 1)
        }
    })
}

fn jira_search(config: &PmToolConfig, params: &HashMap<String, String>) -> Value {
    let total = config.issue_universe;
    let project = params
        .get("jql")
        .and_then(|jql| jql_project(jql))
        .unwrap_or_else(|| DEFAULT_PROJECT.to_string());
    let start_at: usize = param(params, "startAt").unwrap_or(0);
    let max_results: usize = param(params, "maxResults").unwrap_or(DEFAULT_MAX_RESULTS);

    let end = start_at.saturating_add(max_results).min(total);
    let issues: Vec<Value> = (start_at.min(end)..end)
        .map(|i| synthetic_issue(&project, i))
        .collect();
    debug!("pm-tool: search {} startAt={} -> {} issues", project, start_at, issues.len());

    json!({
        "expand": "names,schema",
        "startAt": start_at,
        "maxResults": max_results,
        "total": total,
        "issues": issues
    })
}

fn jira_create_issue(state: &PmToolState, headers: &HeaderMap, body: &[u8]) -> Response {
    if !credentials(headers).map(|c| c.is_basic()).unwrap_or(false) {
        return jira_error(
            StatusCode::UNAUTHORIZED,
            "You are not authenticated. Authentication required to perform this operation.",
        );
    }

    let payload: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => {
            return jira_error(
                StatusCode::BAD_REQUEST,
                "Invalid request payload. Refer to the REST API documentation and try again.",
            )
        }
    };

    let fields = &payload["fields"];
    let mut errors = serde_json::Map::new();
    let project = fields["project"]["key"].as_str().map(str::to_string);
    if project.is_none() {
        errors.insert("project".into(), json!("project is required"));
    }
    if fields["summary"].as_str().map(str::is_empty).unwrap_or(true) {
        errors.insert("summary".into(), json!("You must specify a summary of the issue."));
    }
    let Some(project) = project.filter(|_| errors.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errorMessages": [], "errors": errors })),
        )
            .into_response();
    };

    let mut created = state.created.lock();
    // created keys continue after the search universe
    let number = state.config.issue_universe + created.len() + 1;
    let key = format!("{}-{}", project, number);
    created.push(key.clone());
    info!("pm-tool: created issue {}", key);

    (
        StatusCode::CREATED,
        Json(json!({
            "id": (10000 + number).to_string(),
            "key": key,
            "self": format!("/rest/api/2/issue/{}", 10000 + number)
        })),
    )
        .into_response()
}

/// Feature at `index` in the virtual Aha! universe
pub fn synthetic_feature(index: usize) -> Value {
    let number = index + 1;
    json!({
        "id": format!("{}", 7_000_000_000u64 + number as u64),
        "reference_num": format!("FEAT-{}", number),
        "name": format!("Feature {}", number),
        "created_at": synthetic_timestamp(index),
        "workflow_status": { "name": FEATURE_STATUSES[index % FEATURE_STATUSES.len()] },
        "release": { "name": RELEASES[index % RELEASES.len()] },
        "score": (index * 7) % 100,
        "tags": [TEAMS[index % TEAMS.len()].to_lowercase()],
        "assigned_to_user": ASSIGNEES[index % ASSIGNEES.len()]
            .map(|name| json!({ "name": name, "email": format!("{}@example.com", name) }))
    })
}

fn aha_features(config: &PmToolConfig, headers: &HeaderMap, params: &HashMap<String, String>) -> Response {
    if credentials(headers).and_then(|c| c.bearer_token().map(str::to_string)).is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized", "message": "A valid Bearer token is required" })),
        )
            .into_response();
    }

    let total = config.feature_universe;
    let per_page = param(params, "per_page").filter(|n: &usize| *n > 0).unwrap_or(DEFAULT_PER_PAGE);
    let page = param(params, "page").filter(|n: &usize| *n > 0).unwrap_or(1);
    let start = (page - 1).saturating_mul(per_page).min(total);
    let end = start.saturating_add(per_page).min(total);
    let features: Vec<Value> = (start..end).map(synthetic_feature).collect();

    Json(json!({
        "features": features,
        "pagination": {
            "total_records": total,
            "total_pages": total.div_ceil(per_page),
            "current_page": page
        }
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Request;
    use tower::ServiceExt;

    async fn send(emulator: &PmToolEmulator, request: Request) -> (StatusCode, Value) {
        let resp = emulator.router().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_jql_project() {
        assert_eq!(jql_project("project = FERN AND status = Done").as_deref(), Some("FERN"));
        assert_eq!(jql_project("PROJECT=\"abc\"").as_deref(), Some("ABC"));
        assert_eq!(jql_project("status = Done"), None);
    }

    #[test]
    fn test_synthetic_issue_is_deterministic() {
        assert_eq!(synthetic_issue("TEST", 42), synthetic_issue("TEST", 42));
        let issue = synthetic_issue("TEST", 0);
        assert_eq!(issue["key"], "TEST-1");
        assert_eq!(issue["fields"]["status"]["name"], "To Do");
        assert_eq!(synthetic_issue("TEST", 3)["fields"]["assignee"], Value::Null);
    }

    #[tokio::test]
    async fn test_search_pages_cover_universe() {
        let pm = PmToolEmulator::default();
        let (_, first) = send(&pm, get("/rest/api/2/search?jql=project%3DTEST&startAt=0&maxResults=50")).await;
        let (_, second) = send(&pm, get("/rest/api/2/search?jql=project%3DTEST&startAt=50&maxResults=50")).await;

        let mut keys: Vec<String> = first["issues"]
            .as_array()
            .unwrap()
            .iter()
            .chain(second["issues"].as_array().unwrap())
            .map(|i| i["key"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys.len(), 100);
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 100);
        assert_eq!(first["total"], 100);
    }

    #[tokio::test]
    async fn test_search_past_end_is_empty() {
        let pm = PmToolEmulator::default();
        let (status, body) = send(&pm, get("/rest/api/2/search?startAt=150")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["issues"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_create_issue_requires_basic() {
        let pm = PmToolEmulator::default();
        let payload = json!({ "fields": { "project": { "key": "TEST" }, "summary": "New", "issuetype": { "name": "Bug" } } });

        let req = Request::builder()
            .method("POST")
            .uri("/rest/api/2/issue")
            .header("Authorization", "Bearer abc")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, body) = send(&pm, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["errorMessages"].is_array());

        let req = Request::builder()
            .method("POST")
            .uri("/rest/api/2/issue")
            .header("Authorization", "Basic dTpw")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, body) = send(&pm, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["key"], "TEST-101");
        assert_eq!(pm.created_issues(), vec!["TEST-101".to_string()]);
    }

    #[tokio::test]
    async fn test_create_issue_validates_fields() {
        let pm = PmToolEmulator::default();
        let req = Request::builder()
            .method("POST")
            .uri("/rest/api/2/issue")
            .header("Authorization", "Basic dTpw")
            .body(Body::from(json!({ "fields": { "project": { "key": "TEST" } } }).to_string()))
            .unwrap();
        let (status, body) = send(&pm, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["summary"].is_string());
    }

    #[tokio::test]
    async fn test_aha_requires_bearer_and_paginates() {
        let pm = PmToolEmulator::default();
        let (status, body) = send(&pm, get("/api/v1/features")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let req = Request::builder()
            .uri("/api/v1/features?page=2&per_page=15")
            .header("Authorization", "Bearer aha-token")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&pm, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["features"].as_array().unwrap().len(), 5);
        assert_eq!(body["features"][0]["reference_num"], "FEAT-16");
        assert_eq!(body["pagination"]["total_pages"], 2);
    }

    #[tokio::test]
    async fn test_canned_responses_only_cover_unmatched_routes() {
        let pm = PmToolEmulator::default();
        pm.simulate_error("GET", "/api/v1/releases", 503, "Service Unavailable");
        let (status, body) = send(&pm, get("/api/v1/releases")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Service Unavailable");

        pm.simulate_error("GET", "/rest/api/2/search", 500, "boom");
        let (status, _) = send(&pm, get("/rest/api/2/search")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&pm, get("/nowhere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["path"], "/nowhere");
    }

    #[tokio::test]
    async fn test_simulate_timeout_delays_configuration_not_requests() {
        let pm = PmToolEmulator::default();
        let started = std::time::Instant::now();
        pm.simulate_timeout("GET", "/slow", Duration::from_millis(80)).await;
        assert!(started.elapsed() >= Duration::from_millis(80));

        let started = std::time::Instant::now();
        let (status, body) = send(&pm, get("/slow")).await;
        assert!(started.elapsed() < Duration::from_millis(80));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "delayed");
    }

    #[tokio::test]
    async fn test_simulate_latency_delays_each_request() {
        let pm = PmToolEmulator::default();
        pm.simulate_latency(
            "GET",
            "/lagged",
            Duration::from_millis(50),
            MockResponse::json(json!({ "ok": true })),
        );
        for _ in 0..2 {
            let started = std::time::Instant::now();
            let (status, _) = send(&pm, get("/lagged")).await;
            assert_eq!(status, StatusCode::OK);
            assert!(started.elapsed() >= Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn test_reset_clears_ledger_and_overrides() {
        let pm = PmToolEmulator::default();
        pm.set_response("GET", "/x", MockResponse::json(json!({})));
        send(&pm, get("/x")).await;
        assert_eq!(pm.requests_for_path("/x").len(), 1);

        pm.reset();
        assert!(pm.requests().is_empty());
        let (status, _) = send(&pm, get("/x")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

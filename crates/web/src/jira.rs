//! JIRA REST v2 emulator
//!
//! Reproduces the slice of JIRA's REST API a PM-connector client touches
//! while authenticating and reading metadata:
//!
//! - `GET /rest/api/2/myself` (the only route that checks `Authorization`)
//! - `GET /rest/api/2/project/:key`
//! - `GET /rest/api/2/field`
//! - `GET /rest/api/2/issuetype`
//! - `GET /rest/api/2/serverInfo`
//!
//! Anything else falls through to the ledger's canned responses, then 404.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fern_common::{Error, RequestLedger};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{credentials, Credentials};
use crate::server::{canned_response, Emulator};

/// Seed data for a JIRA project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSeed {
    pub key: String,
    pub name: String,
}

/// JIRA emulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraConfig {
    pub enabled: bool,
    /// Listen port, 0 for ephemeral
    pub port: u16,
    /// Bearer tokens accepted by `/myself`
    pub valid_tokens: Vec<String>,
    pub projects: Vec<ProjectSeed>,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 0,
            valid_tokens: vec!["valid-token".to_string()],
            projects: vec![ProjectSeed {
                key: "TEST".to_string(),
                name: "Test Project".to_string(),
            }],
        }
    }
}

const FIRST_PROJECT_ID: u32 = 10000;

/// JIRA REST emulator
#[derive(Clone)]
pub struct JiraEmulator {
    state: Arc<JiraState>,
}

struct JiraState {
    ledger: Arc<RequestLedger>,
    config: JiraConfig,
    tokens: Mutex<HashSet<String>>,
    /// Project key -> (numeric id, name)
    projects: Mutex<HashMap<String, (u32, String)>>,
}

impl JiraState {
    fn seed(&self) {
        let mut tokens = self.tokens.lock();
        tokens.clear();
        tokens.extend(self.config.valid_tokens.iter().cloned());

        self.projects.lock().clear();
        for p in &self.config.projects {
            self.insert_project(p.key.clone(), p.name.clone());
        }
    }

    /// Insert or rename a project; a re-added key keeps its id
    fn insert_project(&self, key: String, name: String) {
        let mut projects = self.projects.lock();
        let next_id = FIRST_PROJECT_ID + projects.len() as u32;
        projects
            .entry(key)
            .and_modify(|(_, existing)| *existing = name.clone())
            .or_insert((next_id, name));
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<Credentials, Error> {
        match credentials(headers) {
            Some(creds @ Credentials::Basic { .. }) => Ok(creds),
            Some(Credentials::Bearer(token)) if self.tokens.lock().contains(&token) => {
                Ok(Credentials::Bearer(token))
            }
            Some(Credentials::Bearer(_)) => Err(Error::Authentication("invalid bearer token".into())),
            None => Err(Error::Authentication("missing authorization header".into())),
        }
    }
}

impl JiraEmulator {
    pub fn new(config: JiraConfig) -> Self {
        let state = JiraState {
            ledger: Arc::new(RequestLedger::new()),
            config,
            tokens: Mutex::new(HashSet::new()),
            projects: Mutex::new(HashMap::new()),
        };
        state.seed();
        Self {
            state: Arc::new(state),
        }
    }

    /// Accept `token` as a valid bearer token from now on
    pub fn add_valid_token(&self, token: impl Into<String>) {
        let token = token.into();
        debug!("jira: allowing bearer token");
        self.state.tokens.lock().insert(token);
    }

    /// Seed (or rename) a project
    pub fn add_project(&self, key: impl Into<String>, name: impl Into<String>) {
        let key = key.into();
        info!("jira: adding project {}", key);
        self.state.insert_project(key, name.into());
    }

    pub fn has_project(&self, key: &str) -> bool {
        self.state.projects.lock().contains_key(key)
    }
}

impl Default for JiraEmulator {
    fn default() -> Self {
        Self::new(JiraConfig::default())
    }
}

impl Emulator for JiraEmulator {
    fn name(&self) -> &'static str {
        "jira"
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/rest/api/2/myself", get(myself_handler))
            .route("/rest/api/2/project/:key", get(project_handler))
            .route("/rest/api/2/field", get(fields_handler))
            .route("/rest/api/2/issuetype", get(issue_types_handler))
            .route("/rest/api/2/serverInfo", get(server_info_handler))
            .fallback(fallback_handler)
            .with_state(self.state.clone())
    }

    fn ledger(&self) -> &Arc<RequestLedger> {
        &self.state.ledger
    }

    fn reset(&self) {
        info!("jira: reset");
        self.state.ledger.reset();
        self.state.seed();
    }
}

/// Render an error in JIRA's `{errorMessages, errors}` envelope.
pub(crate) fn jira_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "errorMessages": [message.into()],
            "errors": {}
        })),
    )
        .into_response()
}

fn jira_error_from(err: Error) -> Response {
    let message = match &err {
        Error::Authentication(_) => "Unauthorized".to_string(),
        Error::NotFound { kind, id } if kind == "project" => {
            format!("No project could be found with key '{}'.", id)
        }
        other => other.to_string(),
    };
    jira_error(err.status_code(), message)
}

/// User record for `/myself`; shared with the generic PM tool emulator.
pub(crate) fn user_record(username: &str) -> Value {
    let name = if username.is_empty() { "mock-user" } else { username };
    json!({
        "accountId": format!("acc-{}", name),
        "name": name,
        "key": name,
        "emailAddress": format!("{}@example.com", name),
        "displayName": "Mock User",
        "active": true,
        "timeZone": "UTC",
        "locale": "en_US"
    })
}

async fn myself_handler(State(state): State<Arc<JiraState>>, headers: HeaderMap) -> Response {
    match state.authenticate(&headers) {
        Ok(Credentials::Basic { username }) => Json(user_record(&username)).into_response(),
        Ok(Credentials::Bearer(_)) => Json(user_record("")).into_response(),
        Err(e) => jira_error_from(e),
    }
}

async fn project_handler(State(state): State<Arc<JiraState>>, Path(key): Path<String>) -> Response {
    let Some((id, name)) = state.projects.lock().get(&key).cloned() else {
        return jira_error_from(Error::not_found("project", key));
    };

    Json(json!({
        "id": id.to_string(),
        "key": key,
        "name": name,
        "projectTypeKey": "software",
        "simplified": false,
        "style": "classic",
        "lead": user_record(""),
        "issueTypes": issue_types()
    }))
    .into_response()
}

async fn fields_handler() -> impl IntoResponse {
    Json(fields())
}

async fn issue_types_handler() -> impl IntoResponse {
    Json(issue_types())
}

async fn server_info_handler() -> impl IntoResponse {
    Json(json!({
        "version": "9.12.0",
        "versionNumbers": [9, 12, 0],
        "deploymentType": "Server",
        "buildNumber": 912000,
        "serverTitle": "Fern Mock JIRA",
        "scmInfo": "mock"
    }))
}

async fn fallback_handler(State(state): State<Arc<JiraState>>, method: Method, uri: Uri) -> Response {
    match canned_response(&state.ledger, &method, uri.path()).await {
        Some(resp) => resp,
        None => jira_error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn fields() -> Value {
    json!([
        { "id": "summary", "key": "summary", "name": "Summary", "custom": false,
          "schema": { "type": "string", "system": "summary" } },
        { "id": "description", "key": "description", "name": "Description", "custom": false,
          "schema": { "type": "string", "system": "description" } },
        { "id": "status", "key": "status", "name": "Status", "custom": false,
          "schema": { "type": "status", "system": "status" } },
        { "id": "priority", "key": "priority", "name": "Priority", "custom": false,
          "schema": { "type": "priority", "system": "priority" } },
        { "id": "assignee", "key": "assignee", "name": "Assignee", "custom": false,
          "schema": { "type": "user", "system": "assignee" } },
        { "id": "issuetype", "key": "issuetype", "name": "Issue Type", "custom": false,
          "schema": { "type": "issuetype", "system": "issuetype" } },
        { "id": "fixVersions", "key": "fixVersions", "name": "Fix Version/s", "custom": false,
          "schema": { "type": "array", "items": "version", "system": "fixVersions" } },
        { "id": "customfield_10001", "key": "customfield_10001", "name": "Team", "custom": true,
          "schema": { "type": "option", "custom": "com.atlassian.jira.plugin.system.customfieldtypes:select", "customId": 10001 } },
        { "id": "customfield_10002", "key": "customfield_10002", "name": "Story Points", "custom": true,
          "schema": { "type": "number", "custom": "com.atlassian.jira.plugin.system.customfieldtypes:float", "customId": 10002 } }
    ])
}

fn issue_types() -> Value {
    json!([
        { "id": "10001", "name": "Story", "subtask": false, "description": "A user story" },
        { "id": "10002", "name": "Bug", "subtask": false, "description": "A problem or error" },
        { "id": "10003", "name": "Task", "subtask": false, "description": "A task that needs to be done" },
        { "id": "10004", "name": "Epic", "subtask": false, "description": "A big user story" },
        { "id": "10005", "name": "Sub-task", "subtask": true, "description": "A small piece of work" }
    ])
}

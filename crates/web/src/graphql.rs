//! GraphQL PM connector emulator
//!
//! Stands in for the platform's connector-management GraphQL API on a single
//! `POST /` endpoint. There is no GraphQL engine: the operation is resolved
//! by name (the request's `operationName`, or the name declared on the
//! first operation in the document) and dispatched to a fixed handler.
//! Selection sets are ignored; every handler returns its full payload.

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use fern_common::{
    ConnectorInput, Error, FieldMapping, FieldMappingInput, HealthStatus, PmConnector, RequestLedger,
    SyncSummary,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::server::{canned_response, Emulator};

/// GraphQL emulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphqlConfig {
    pub enabled: bool,
    pub port: u16,
    /// Requirement count reported after every sync
    pub sync_requirement_count: u32,
}

impl Default for GraphqlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 0,
            sync_requirement_count: 150,
        }
    }
}

/// Operations understood by the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetPmConnectors,
    CreatePmConnector,
    SetPmConnectorCredentials,
    TestPmConnection,
    SyncPmConnector,
    GetConnectorMappings,
    UpdateFieldMappings,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::GetPmConnectors,
        Operation::CreatePmConnector,
        Operation::SetPmConnectorCredentials,
        Operation::TestPmConnection,
        Operation::SyncPmConnector,
        Operation::GetConnectorMappings,
        Operation::UpdateFieldMappings,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetPmConnectors => "GetPMConnectors",
            Operation::CreatePmConnector => "CreatePMConnector",
            Operation::SetPmConnectorCredentials => "SetPMConnectorCredentials",
            Operation::TestPmConnection => "TestPMConnection",
            Operation::SyncPmConnector => "SyncPMConnector",
            Operation::GetConnectorMappings => "GetConnectorMappings",
            Operation::UpdateFieldMappings => "UpdateFieldMappings",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

/// Incoming GraphQL request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub variables: Value,
    #[serde(default)]
    pub operation_name: Option<String>,
}

impl GraphqlRequest {
    /// Name of the operation to run: `operationName` when present, otherwise
    /// the name declared on the first operation in the document.
    pub fn resolved_operation_name(&self) -> Option<String> {
        self.operation_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| declared_operation_name(&self.query))
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Ident(String),
    Open,
}

/// Extract `Name` from the first top-level `query Name` / `mutation Name` /
/// `subscription Name` definition. Comments and nested selection sets are
/// skipped, so a name mentioned inside them is never picked up.
pub fn declared_operation_name(document: &str) -> Option<String> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for line in document.lines() {
        for c in line.chars() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            if c == '#' {
                break;
            }
            if depth == 0 && (c.is_alphanumeric() || c == '_') {
                current.push(c);
                continue;
            }
            if !current.is_empty() {
                tokens.push(Token::Ident(std::mem::take(&mut current)));
            }
            match c {
                '"' => in_string = true,
                '{' | '(' => {
                    if depth == 0 {
                        tokens.push(Token::Open);
                    }
                    depth += 1;
                }
                '}' | ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        if !current.is_empty() {
            tokens.push(Token::Ident(std::mem::take(&mut current)));
        }
    }

    tokens.windows(2).find_map(|pair| match pair {
        [Token::Ident(keyword), Token::Ident(name)]
            if matches!(keyword.as_str(), "query" | "mutation" | "subscription") =>
        {
            Some(name.clone())
        }
        _ => None,
    })
}

#[derive(Debug, Default)]
struct ConnectorStore {
    connectors: Vec<PmConnector>,
    mappings: HashMap<String, Vec<FieldMapping>>,
    next_id: u64,
}

impl ConnectorStore {
    fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut PmConnector, Error> {
        self.connectors
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found("connector", id))
    }

    fn node(&self, connector: &PmConnector) -> Value {
        let mut node = serde_json::to_value(connector).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut node {
            let mappings = self.mappings.get(&connector.id).cloned().unwrap_or_default();
            map.insert("fieldMappings".to_string(), json!(mappings));
        }
        node
    }
}

/// GraphQL PM connector emulator
#[derive(Clone)]
pub struct GraphqlEmulator {
    state: Arc<GraphqlState>,
}

struct GraphqlState {
    ledger: Arc<RequestLedger>,
    config: GraphqlConfig,
    store: Mutex<ConnectorStore>,
}

impl GraphqlEmulator {
    pub fn new(config: GraphqlConfig) -> Self {
        Self {
            state: Arc::new(GraphqlState {
                ledger: Arc::new(RequestLedger::new()),
                config,
                store: Mutex::new(ConnectorStore::new()),
            }),
        }
    }

    /// Snapshot of all connectors in creation order
    pub fn connectors(&self) -> Vec<PmConnector> {
        self.state.store.lock().connectors.clone()
    }

    pub fn connector(&self, id: &str) -> Option<PmConnector> {
        self.state
            .store
            .lock()
            .connectors
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn mappings(&self, connector_id: &str) -> Vec<FieldMapping> {
        self.state
            .store
            .lock()
            .mappings
            .get(connector_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Run an operation directly, bypassing HTTP. Returns the `data` payload.
    pub fn execute(&self, request: &GraphqlRequest) -> Result<Value, Error> {
        self.state.execute(request)
    }
}

impl Default for GraphqlEmulator {
    fn default() -> Self {
        Self::new(GraphqlConfig::default())
    }
}

impl Emulator for GraphqlEmulator {
    fn name(&self) -> &'static str {
        "graphql"
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", post(graphql_handler))
            .fallback(fallback_handler)
            .with_state(self.state.clone())
    }

    fn ledger(&self) -> &Arc<RequestLedger> {
        &self.state.ledger
    }

    fn reset(&self) {
        info!("graphql: reset");
        self.state.ledger.reset();
        *self.state.store.lock() = ConnectorStore::new();
    }
}

impl GraphqlState {
    fn execute(&self, request: &GraphqlRequest) -> Result<Value, Error> {
        let name = request
            .resolved_operation_name()
            .ok_or_else(|| Error::UnknownOperation("no operation name".into()))?;
        let op = Operation::from_name(&name).ok_or(Error::UnknownOperation(name))?;
        debug!("graphql: {}", op.name());

        let vars = &request.variables;
        let data = match op {
            Operation::GetPmConnectors => json!({ "pmConnectors": self.list_connectors(vars)? }),
            Operation::CreatePmConnector => json!({ "createPMConnector": self.create_connector(vars)? }),
            Operation::SetPmConnectorCredentials => {
                json!({ "setPMConnectorCredentials": self.set_credentials(vars)? })
            }
            Operation::TestPmConnection => json!({ "testPMConnection": self.test_connection(vars)? }),
            Operation::SyncPmConnector => json!({ "syncPMConnector": self.sync_connector(vars)? }),
            Operation::GetConnectorMappings => {
                json!({ "connectorMappings": self.get_mappings(vars)? })
            }
            Operation::UpdateFieldMappings => {
                json!({ "updateFieldMappings": self.update_mappings(vars)? })
            }
        };
        Ok(data)
    }

    /// Edge/cursor page over the connector sequence; the cursor is the
    /// array index.
    fn list_connectors(&self, vars: &Value) -> Result<Value, Error> {
        let store = self.store.lock();
        let total = store.connectors.len();

        let start = match vars.get("after") {
            None | Some(Value::Null) => 0,
            Some(after) => parse_cursor(after)?
                .checked_add(1)
                .ok_or_else(|| Error::MalformedRequest("invalid cursor".into()))?,
        };
        let first = match vars.get("first") {
            None | Some(Value::Null) => total,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| Error::MalformedRequest("first must be a non-negative integer".into()))?
                as usize,
        };
        let end = start.saturating_add(first).min(total);
        let start = start.min(end);

        let edges: Vec<Value> = store.connectors[start..end]
            .iter()
            .enumerate()
            .map(|(offset, c)| {
                json!({
                    "cursor": (start + offset).to_string(),
                    "node": store.node(c)
                })
            })
            .collect();

        Ok(json!({
            "edges": edges,
            "pageInfo": {
                "hasNextPage": end < total,
                "hasPreviousPage": start > 0,
                "startCursor": (start < end).then(|| start.to_string()),
                "endCursor": (start < end).then(|| (end - 1).to_string())
            },
            "totalCount": total
        }))
    }

    fn create_connector(&self, vars: &Value) -> Result<Value, Error> {
        let input_value = vars.get("input").unwrap_or(vars).clone();
        let input: ConnectorInput = serde_json::from_value(input_value)
            .map_err(|e| Error::MalformedRequest(format!("invalid connector input: {}", e)))?;

        let mut store = self.store.lock();
        let id = store.next_id.to_string();
        store.next_id += 1;
        let connector = PmConnector::new(id, input);
        info!("graphql: created connector {} ({})", connector.id, connector.name);
        let node = store.node(&connector);
        store.connectors.push(connector);
        Ok(node)
    }

    fn set_credentials(&self, vars: &Value) -> Result<Value, Error> {
        let id = connector_id(vars)?;
        let mut store = self.store.lock();
        let connector = store.get_mut(&id)?;
        connector.has_credentials = true;
        let connector = connector.clone();
        Ok(json!({ "success": true, "connector": store.node(&connector) }))
    }

    fn test_connection(&self, vars: &Value) -> Result<Value, Error> {
        let id = connector_id(vars)?;
        let mut store = self.store.lock();
        let connector = store.get_mut(&id)?;
        connector.health_status = HealthStatus::Healthy;
        connector.last_health_check = Some(fern_common::now());
        let connector = connector.clone();
        Ok(json!({
            "success": true,
            "healthStatus": connector.health_status,
            "message": "Connection successful",
            "connector": store.node(&connector)
        }))
    }

    fn sync_connector(&self, vars: &Value) -> Result<Value, Error> {
        let id = connector_id(vars)?;
        let count = self.config.sync_requirement_count;
        let mut store = self.store.lock();
        store.get_mut(&id)?.mark_synced(fern_common::now(), count);
        info!("graphql: synced connector {}", id);

        let summary = SyncSummary {
            status: "COMPLETED".to_string(),
            items_processed: count,
            items_failed: 0,
        };
        Ok(serde_json::to_value(summary)?)
    }

    fn get_mappings(&self, vars: &Value) -> Result<Value, Error> {
        let id = connector_id(vars)?;
        let mut store = self.store.lock();
        store.get_mut(&id)?;
        Ok(json!(store.mappings.get(&id).cloned().unwrap_or_default()))
    }

    /// Replace the connector's mapping set wholesale and re-apply the
    /// activation rule.
    fn update_mappings(&self, vars: &Value) -> Result<Value, Error> {
        let id = connector_id(vars)?;
        let inputs: Vec<FieldMappingInput> = match vars.get("mappings") {
            None | Some(Value::Null) => Vec::new(),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| Error::MalformedRequest(format!("invalid mappings: {}", e)))?,
        };

        let mut store = self.store.lock();
        let mappings: Vec<FieldMapping> = inputs
            .into_iter()
            .enumerate()
            .map(|(i, input)| input.into_mapping(&id, i))
            .collect();

        let connector = store.get_mut(&id)?;
        connector.apply_mapping_rule(mappings.len());
        let connector = connector.clone();
        debug!("graphql: connector {} now has {} mappings", id, mappings.len());
        store.mappings.insert(id, mappings.clone());

        Ok(json!({
            "success": true,
            "mappings": mappings,
            "connector": store.node(&connector)
        }))
    }
}

fn connector_id(vars: &Value) -> Result<String, Error> {
    let raw = vars
        .get("connectorId")
        .or_else(|| vars.get("id"))
        .ok_or_else(|| Error::MalformedRequest("missing variable: connectorId".into()))?;
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::MalformedRequest("connectorId must be a string".into())),
    }
}

fn parse_cursor(cursor: &Value) -> Result<usize, Error> {
    let parsed = match cursor {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        _ => None,
    };
    parsed.ok_or_else(|| Error::MalformedRequest("invalid cursor".into()))
}

/// `{"errors": [{"message": ...}]}`
fn graphql_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "errors": [{ "message": message.into() }] })),
    )
        .into_response()
}

fn graphql_error_from(err: Error) -> Response {
    let message = match &err {
        Error::NotFound { id, .. } => format!("Connector not found: {}", id),
        Error::UnknownOperation(name) => format!("Unknown operation: {}", name),
        other => other.to_string(),
    };
    graphql_error(err.status_code(), message)
}

async fn graphql_handler(State(state): State<Arc<GraphqlState>>, body: Bytes) -> Response {
    let request: GraphqlRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!("graphql: undecodable body: {}", e);
            return graphql_error(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    match state.execute(&request) {
        Ok(data) => Json(json!({ "data": data })).into_response(),
        Err(e) => graphql_error_from(e),
    }
}

async fn fallback_handler(State(state): State<Arc<GraphqlState>>, method: Method, uri: Uri) -> Response {
    match canned_response(&state.ledger, &method, uri.path()).await {
        Some(resp) => resp,
        None => graphql_error(StatusCode::NOT_FOUND, "Not found"),
    }
}

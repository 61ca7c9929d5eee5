//! Thin GraphQL client for driving the connector-management emulator the
//! way the platform's UI does.

use serde_json::{json, Value};

use crate::error::{E2eError, E2eResult};

pub const GET_PM_CONNECTORS: &str = r#"
query GetPMConnectors($first: Int, $after: String) {
  pmConnectors(first: $first, after: $after) {
    edges { cursor node { id name type baseURL status healthStatus hasCredentials requirementCount fieldMappings { id sourcePath targetField } } }
    pageInfo { hasNextPage endCursor }
    totalCount
  }
}"#;

pub const CREATE_PM_CONNECTOR: &str = r#"
mutation CreatePMConnector($input: CreatePMConnectorInput!) {
  createPMConnector(input: $input) { id name type status healthStatus }
}"#;

pub const SET_PM_CONNECTOR_CREDENTIALS: &str = r#"
mutation SetPMConnectorCredentials($connectorId: ID!, $credentials: PMCredentialsInput!) {
  setPMConnectorCredentials(connectorId: $connectorId, credentials: $credentials) { success }
}"#;

pub const TEST_PM_CONNECTION: &str = r#"
mutation TestPMConnection($connectorId: ID!) {
  testPMConnection(connectorId: $connectorId) { success healthStatus message }
}"#;

pub const SYNC_PM_CONNECTOR: &str = r#"
mutation SyncPMConnector($connectorId: ID!) {
  syncPMConnector(connectorId: $connectorId) { status itemsProcessed itemsFailed }
}"#;

pub const GET_CONNECTOR_MAPPINGS: &str = r#"
query GetConnectorMappings($connectorId: ID!) {
  connectorMappings(connectorId: $connectorId) { id sourcePath targetField transformType isActive order }
}"#;

pub const UPDATE_FIELD_MAPPINGS: &str = r#"
mutation UpdateFieldMappings($connectorId: ID!, $mappings: [FieldMappingInput!]!) {
  updateFieldMappings(connectorId: $connectorId, mappings: $mappings) { success }
}"#;

/// Raw outcome of a GraphQL POST
#[derive(Debug, Clone)]
pub struct GraphqlResponse {
    pub status: u16,
    pub body: Value,
}

impl GraphqlResponse {
    /// Messages from the `errors` array, if any
    pub fn error_messages(&self) -> Vec<String> {
        self.body["errors"]
            .as_array()
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e["message"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct GraphqlClient {
    http: reqwest::Client,
    url: String,
}

impl GraphqlClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// POST a document and return status plus body without interpreting it
    pub async fn execute(&self, operation: &str, query: &str, variables: Value) -> E2eResult<GraphqlResponse> {
        let resp = self
            .http
            .post(&self.url)
            .json(&json!({
                "operationName": operation,
                "query": query,
                "variables": variables
            }))
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.json().await?;
        Ok(GraphqlResponse { status, body })
    }

    /// Execute and return `data`, turning a GraphQL error array into an error
    pub async fn data(&self, operation: &str, query: &str, variables: Value) -> E2eResult<Value> {
        let resp = self.execute(operation, query, variables).await?;
        let messages = resp.error_messages();
        if !messages.is_empty() {
            return Err(E2eError::Graphql {
                status: resp.status,
                messages,
            });
        }
        Ok(resp.body["data"].clone())
    }

    /// Create a connector and return its id
    pub async fn create_connector(&self, name: &str, kind: &str, base_url: &str) -> E2eResult<String> {
        let data = self
            .data(
                "CreatePMConnector",
                CREATE_PM_CONNECTOR,
                json!({ "input": { "name": name, "type": kind, "baseUrl": base_url } }),
            )
            .await?;
        data["createPMConnector"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| E2eError::AssertionFailed("createPMConnector returned no id".into()))
    }

    pub async fn set_credentials(&self, connector_id: &str, credentials: Value) -> E2eResult<Value> {
        self.data(
            "SetPMConnectorCredentials",
            SET_PM_CONNECTOR_CREDENTIALS,
            json!({ "connectorId": connector_id, "credentials": credentials }),
        )
        .await
    }

    pub async fn test_connection(&self, connector_id: &str) -> E2eResult<Value> {
        self.data(
            "TestPMConnection",
            TEST_PM_CONNECTION,
            json!({ "connectorId": connector_id }),
        )
        .await
    }

    pub async fn sync(&self, connector_id: &str) -> E2eResult<Value> {
        let data = self
            .data("SyncPMConnector", SYNC_PM_CONNECTOR, json!({ "connectorId": connector_id }))
            .await?;
        Ok(data["syncPMConnector"].clone())
    }

    pub async fn mappings(&self, connector_id: &str) -> E2eResult<Vec<Value>> {
        let data = self
            .data(
                "GetConnectorMappings",
                GET_CONNECTOR_MAPPINGS,
                json!({ "connectorId": connector_id }),
            )
            .await?;
        Ok(data["connectorMappings"].as_array().cloned().unwrap_or_default())
    }

    pub async fn update_mappings(&self, connector_id: &str, mappings: Value) -> E2eResult<Value> {
        self.data(
            "UpdateFieldMappings",
            UPDATE_FIELD_MAPPINGS,
            json!({ "connectorId": connector_id, "mappings": mappings }),
        )
        .await
    }

    /// All connector nodes, following cursors page by page
    pub async fn connectors(&self) -> E2eResult<Vec<Value>> {
        let mut nodes = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let data = self
                .data(
                    "GetPMConnectors",
                    GET_PM_CONNECTORS,
                    json!({ "first": 25, "after": after }),
                )
                .await?;
            let page = &data["pmConnectors"];
            if let Some(edges) = page["edges"].as_array() {
                nodes.extend(edges.iter().map(|e| e["node"].clone()));
            }
            if page["pageInfo"]["hasNextPage"] != json!(true) {
                break;
            }
            after = page["pageInfo"]["endCursor"].as_str().map(str::to_string);
            if after.is_none() {
                break;
            }
        }
        Ok(nodes)
    }
}

//! GraphQL connector emulator over real HTTP

use fern_e2e::client::{GET_PM_CONNECTORS, UPDATE_FIELD_MAPPINGS};
use fern_e2e::{E2eError, GraphqlClient, ScenarioHarness};
use fern_mock_web::GraphqlConfig;
use serde_json::json;

async fn setup() -> (ScenarioHarness, GraphqlClient) {
    let mut harness = ScenarioHarness::new().unwrap();
    harness.start_graphql(GraphqlConfig::default()).await.unwrap();
    let client = harness.graphql_client().unwrap();
    (harness, client)
}

fn two_mappings() -> serde_json::Value {
    json!([
        { "sourcePath": "fields.summary", "targetField": "title" },
        { "sourcePath": "fields.priority.name", "targetField": "priority", "transformType": "MAP" }
    ])
}

#[tokio::test]
async fn connector_ids_are_unique_and_increasing() {
    let (harness, client) = setup().await;
    let mut previous = 0u64;
    for i in 0..10 {
        let id: u64 = client
            .create_connector(&format!("connector {}", i), "JIRA", "http://jira.local")
            .await
            .unwrap()
            .parse()
            .unwrap();
        assert!(id > previous, "id {} not greater than {}", id, previous);
        previous = id;
    }
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn credentials_are_scoped_to_one_connector() {
    let (harness, client) = setup().await;
    let x = client.create_connector("x", "JIRA", "http://x").await.unwrap();
    let y = client.create_connector("y", "JIRA", "http://y").await.unwrap();

    client
        .set_credentials(&x, json!({ "username": "qa", "apiToken": "t" }))
        .await
        .unwrap();

    let gql = harness.graphql().unwrap();
    assert!(gql.connector(&x).unwrap().has_credentials);
    assert!(!gql.connector(&y).unwrap().has_credentials);
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn empty_mappings_never_activate() {
    let (harness, client) = setup().await;
    let id = client.create_connector("c", "JIRA", "http://c").await.unwrap();
    client.set_credentials(&id, json!({})).await.unwrap();

    client.update_mappings(&id, two_mappings()).await.unwrap();
    client.update_mappings(&id, json!([])).await.unwrap();

    let connector = harness.graphql().unwrap().connector(&id).unwrap();
    assert_ne!(connector.status, fern_common::ConnectorStatus::Active);
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn mappings_with_credentials_activate_idempotently() {
    let (harness, client) = setup().await;
    let id = client.create_connector("c", "JIRA", "http://c").await.unwrap();
    client.set_credentials(&id, json!({})).await.unwrap();

    for _ in 0..3 {
        client.update_mappings(&id, two_mappings()).await.unwrap();
        let gql = harness.graphql().unwrap();
        assert_eq!(gql.connector(&id).unwrap().status, fern_common::ConnectorStatus::Active);
        assert_eq!(gql.mappings(&id).len(), 2);
    }
    assert_eq!(client.mappings(&id).await.unwrap().len(), 2);
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn mappings_without_credentials_stay_inactive() {
    let (harness, client) = setup().await;
    let id = client.create_connector("c", "JIRA", "http://c").await.unwrap();
    client.update_mappings(&id, two_mappings()).await.unwrap();
    let connector = harness.graphql().unwrap().connector(&id).unwrap();
    assert_eq!(connector.status, fern_common::ConnectorStatus::Inactive);
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn unknown_connector_is_404_with_error_array() {
    let (harness, client) = setup().await;
    let resp = client
        .execute(
            "UpdateFieldMappings",
            UPDATE_FIELD_MAPPINGS,
            json!({ "connectorId": "404", "mappings": [] }),
        )
        .await
        .unwrap();
    assert_eq!(resp.status, 404);
    assert_eq!(resp.error_messages().len(), 1);

    match client.test_connection("404").await {
        Err(E2eError::Graphql { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected GraphQL error, got {:?}", other.map(|_| ())),
    }
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn undecodable_body_is_400() {
    let (harness, _) = setup().await;
    let resp = harness
        .http()
        .post(format!("{}/", harness.graphql_url().unwrap()))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["errors"], json!([{ "message": "Invalid request body" }]));
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn operation_is_resolved_by_name_not_substring() {
    let (harness, _) = setup().await;
    let url = format!("{}/", harness.graphql_url().unwrap());

    // Names only appear in a comment: nothing to dispatch to
    let resp = harness
        .http()
        .post(&url)
        .json(&json!({
            "query": "# GetPMConnectors\n{ pmConnectors { totalCount } }",
            "variables": {}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0]["message"].is_string());
    assert!(body.get("data").is_none());

    // Unknown explicit operationName
    let resp = harness
        .http()
        .post(&url)
        .json(&json!({ "operationName": "DeleteEverything", "query": "", "variables": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body["errors"],
        json!([{ "message": "Unknown operation: DeleteEverything" }])
    );

    // Declared name without operationName
    let resp = harness
        .http()
        .post(&url)
        .json(&json!({ "query": GET_PM_CONNECTORS, "variables": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["pmConnectors"]["totalCount"], 0);
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn sync_reports_summary_and_activates() {
    let (harness, client) = setup().await;
    let id = client.create_connector("c", "JIRA", "http://c").await.unwrap();
    let health = client.test_connection(&id).await.unwrap();
    assert_eq!(health["testPMConnection"]["healthStatus"], "HEALTHY");

    let summary = client.sync(&id).await.unwrap();
    assert_eq!(summary["status"], "COMPLETED");
    assert_eq!(summary["itemsFailed"], 0);

    let connector = harness.graphql().unwrap().connector(&id).unwrap();
    assert_eq!(connector.status, fern_common::ConnectorStatus::Active);
    assert!(connector.next_sync_at > connector.last_sync_at);
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn oversized_cursor_gets_error_envelope() {
    let (harness, client) = setup().await;
    client.create_connector("c", "JIRA", "http://c").await.unwrap();
    let resp = client
        .execute(
            "GetPMConnectors",
            GET_PM_CONNECTORS,
            json!({ "after": u64::MAX.to_string() }),
        )
        .await
        .unwrap();
    assert_eq!(resp.status, 400);
    assert_eq!(resp.error_messages().len(), 1);

    // the emulator keeps serving after the bad request
    assert_eq!(client.connectors().await.unwrap().len(), 1);
    harness.teardown().await.unwrap();
}

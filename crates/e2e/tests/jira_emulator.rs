//! JIRA REST emulator over real HTTP

use fern_e2e::ScenarioHarness;
use fern_mock_web::{Emulator, JiraConfig};
use reqwest::StatusCode;
use serde_json::Value;
use test_case::test_case;

async fn harness() -> ScenarioHarness {
    let mut harness = ScenarioHarness::new().unwrap();
    harness.start_jira(JiraConfig::default()).await.unwrap();
    harness
}

async fn get(harness: &ScenarioHarness, path: &str, auth: Option<&str>) -> (StatusCode, Value) {
    let url = format!("{}{}", harness.jira_url().unwrap(), path);
    let mut req = harness.http().get(url);
    if let Some(auth) = auth {
        req = req.header("Authorization", auth);
    }
    let resp = req.send().await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn myself_without_authorization_is_401() {
    let harness = harness().await;
    let (status, body) = get(&harness, "/rest/api/2/myself", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errorMessages"], serde_json::json!(["Unauthorized"]));
    assert!(body["errors"].is_object());
    harness.teardown().await.unwrap();
}

#[test_case("Basic YWRtaW46YWRtaW4=", StatusCode::OK ; "basic always accepted")]
#[test_case("Bearer valid-token", StatusCode::OK ; "seeded bearer token")]
#[test_case("Bearer stolen-token", StatusCode::UNAUTHORIZED ; "unknown bearer token")]
#[test_case("Token abc", StatusCode::UNAUTHORIZED ; "unknown scheme")]
#[tokio::test]
async fn myself_authorization(header: &str, expected: StatusCode) {
    let harness = harness().await;
    let (status, _) = get(&harness, "/rest/api/2/myself", Some(header)).await;
    assert_eq!(status, expected);
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn unknown_project_is_404_with_jira_message() {
    let harness = harness().await;
    let url = format!("{}/rest/api/2/project/UNKNOWN", harness.jira_url().unwrap());
    let resp = harness.http().get(url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let text = resp.text().await.unwrap();
    assert!(text.contains("No project could be found with key 'UNKNOWN'."));
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn scenario_can_extend_tokens_and_projects() {
    let harness = harness().await;
    let jira = harness.jira().unwrap();
    jira.add_valid_token("pat-123");
    jira.add_project("REQ", "Requirements");

    let (status, body) = get(&harness, "/rest/api/2/project/REQ", Some("Bearer pat-123")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "REQ");
    assert_eq!(body["name"], "Requirements");
    harness.teardown().await.unwrap();
}

#[tokio::test]
async fn server_info_needs_no_auth_and_requests_are_recorded() {
    let harness = harness().await;
    let (status, body) = get(&harness, "/rest/api/2/serverInfo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());

    get(&harness, "/rest/api/2/field", Some("Basic dTpw")).await;

    let jira = harness.jira().unwrap();
    let recorded = jira.ledger().requests();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].path, "/rest/api/2/serverInfo");
    assert_eq!(recorded[1].header("authorization"), Some("Basic dTpw"));
    harness.teardown().await.unwrap();
}

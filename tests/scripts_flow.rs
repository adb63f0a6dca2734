//! Integration tests for script packages and their assignments.
//!
//! - POST   /beta/deviceManagement/deviceHealthScripts            — new_script_package
//! - DELETE /beta/deviceManagement/deviceHealthScripts/{id}       — delete_script_package
//! - POST   /beta/deviceManagement/deviceHealthScripts/{id}/assign — assign_script_*

use chrono::{TimeZone, Utc};
use intune_graph::assignments::*;
use intune_graph::auth::RefreshTokenProvider;
use intune_graph::client::GraphClient;
use intune_graph::error::IntuneError;
use intune_graph::scripts::*;
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn authenticated_client(server: &MockServer) -> GraphClient {
    let auth = RefreshTokenProvider::with_token("mock-token");
    let client = GraphClient::with_base_url(auth, &format!("{}/beta/", server.uri()))
        .unwrap()
        .with_clock(FixedClock(Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()));
    client.establish_session().await.unwrap();
    client
}

// ── new_script_package / delete_script_package ─────────────────────────

#[tokio::test]
async fn new_script_returns_server_id() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .and(body_json(serde_json::json!({
            "displayName": "Check disk",
            "description": "",
            "publisher": "IT",
            "runAs32Bit": true,
            "runAsAccount": "system",
            "enforceSignatureCheck": false,
            "detectionScriptContent": "exit 1",
            "remediationScriptContent": "Clear-RecycleBin -Force",
            "roleScopeTagIds": ["0"]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "s-1",
            "displayName": "Check disk"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let package = ScriptPackage::new("Check disk", "exit 1")
        .with_publisher("IT")
        .with_remediation_script("Clear-RecycleBin -Force");
    let script_id = new_script_package(&client, &package).await.unwrap();

    assert_eq!(script_id.as_deref(), Some("s-1"));
}

#[tokio::test]
async fn script_response_without_id_is_missing_id() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let err = new_script_package(&client, &ScriptPackage::new("x", "y"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IntuneError::MissingId {
            resource: "script package"
        }
    ));
}

#[tokio::test]
async fn delete_script_targets_script_by_id() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("DELETE"))
        .and(path("/beta/deviceManagement/deviceHealthScripts/s-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    delete_script_package(&client, "s-1").await.unwrap();
}

// ── assign_script_* ────────────────────────────────────────────────────

#[tokio::test]
async fn run_once_assignment_is_five_minutes_out() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts/s-1/assign"))
        .and(body_json(serde_json::json!({
            "deviceHealthScriptAssignments": [{
                "target": {
                    "@odata.type": "#microsoft.graph.allDevicesAssignmentTarget",
                    "deviceAndAppManagementAssignmentFilterId": "f-1",
                    "deviceAndAppManagementAssignmentFilterType": "include"
                },
                "runRemediationScript": true,
                "runSchedule": {
                    "@odata.type": "#microsoft.graph.deviceHealthScriptRunOnceSchedule",
                    "interval": 1,
                    "date": "2026-03-14",
                    "time": "09:31:53",
                    "useUtc": true
                }
            }]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assign_script_once(&client, "f-1", "s-1").await.unwrap();
}

#[tokio::test]
async fn hourly_assignment_has_interval_only() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts/s-1/assign"))
        .and(body_partial_json(serde_json::json!({
            "deviceHealthScriptAssignments": [{
                "runSchedule": {
                    "@odata.type": "#microsoft.graph.deviceHealthScriptHourlySchedule",
                    "interval": 1
                }
            }]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assign_script_hourly(&client, "f-1", "s-1").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let schedule = &sent["deviceHealthScriptAssignments"][0]["runSchedule"];
    assert!(schedule.get("date").is_none());
    assert!(schedule.get("time").is_none());
}

#[tokio::test]
async fn assignment_with_empty_ids_sends_nothing() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = assign_script_once(&client, "", "s-1").await.unwrap_err();
    assert!(matches!(err, IntuneError::InvalidArgument(_)));
    let err = assign_script_hourly(&client, "f-1", "").await.unwrap_err();
    assert!(matches!(err, IntuneError::InvalidArgument(_)));
}

#[tokio::test]
async fn create_then_assign_once_posts_assignment_exactly_once() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "s-1"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts/s-1/assign"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let script_id = new_script_package(&client, &ScriptPackage::new("Check", "exit 0"))
        .await
        .unwrap()
        .unwrap();
    assign_script_once(&client, "f-1", &script_id).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let assign = requests
        .iter()
        .find(|r| r.url.path().ends_with("/assign"))
        .unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&assign.body).unwrap();
    let schedule = &sent["deviceHealthScriptAssignments"][0]["runSchedule"];
    assert_eq!(schedule["date"], "2026-03-14");
    assert_eq!(schedule["time"], "09:31:53");
}

//! End-to-end mock server lifecycle: start a listener, drive real HTTP
//! requests at it, shut it down, and reconcile the observed invocations —
//! exercising the whole `mock::MockServer` path the Suite runner brackets
//! around each element, without going through the Suite runner itself so
//! the ephemeral port can be read back before requests are sent.

use httpbench::engine::model::HeaderMap;
use httpbench::mock::{MockDefinition, MockServer};
use httpbench::registry;
use std::collections::HashMap;

fn status_check(expected: u16) -> Box<dyn httpbench::checks::Check> {
    registry::build_check(&serde_json::json!({ "type": "StatusCode", "expected": expected }))
        .expect("StatusCode check should build")
}

#[tokio::test]
async fn matched_request_passes_its_checks_and_renders_the_templated_response() {
    registry::register_builtins();

    let defs = vec![MockDefinition {
        name: "get-user".into(),
        method: "GET".into(),
        url_pattern: "/users/{id}".into(),
        checks: vec![status_check(0)], // synthetic request always reports 0
        extractors: Vec::new(),
        response_status: 200,
        response_headers: HeaderMap::new(),
        response_body: "hello {{id}}".into(),
    }];

    let server = MockServer::start(defs, HashMap::new()).await.unwrap();
    let addr = server.addr;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/users/42"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert_eq!(body, "hello 42");

    let reports = server.shutdown().await;
    let (reports, status) = MockServer::reconcile(1, reports);
    assert_eq!(status, httpbench::engine::model::Status::Pass);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].label.contains("get-user"));
}

#[tokio::test]
async fn unmatched_request_is_reported_and_a_declared_mock_left_uninvoked_errors() {
    registry::register_builtins();

    let defs = vec![MockDefinition {
        name: "never-called".into(),
        method: "POST".into(),
        url_pattern: "/orders".into(),
        checks: Vec::new(),
        extractors: Vec::new(),
        response_status: 201,
        response_headers: HeaderMap::new(),
        response_body: String::new(),
    }];

    let server = MockServer::start(defs, HashMap::new()).await.unwrap();
    let addr = server.addr;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/not-a-declared-route"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let reports = server.shutdown().await;
    let (reports, status) = MockServer::reconcile(1, reports);

    assert_eq!(status, httpbench::engine::model::Status::Error);
    // one report for the unmatched incoming request, one synthesized for
    // the declared mock that was never invoked
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().any(|r| r.label == "Not Found"));
    assert!(reports
        .iter()
        .any(|r| r.label.contains("not invoked") && r.status == httpbench::engine::model::Status::Error));
}

#[tokio::test]
async fn failing_mock_check_surfaces_as_a_fail_report() {
    registry::register_builtins();

    let defs = vec![MockDefinition {
        name: "wrong-status-expectation".into(),
        method: "GET".into(),
        url_pattern: "/health".into(),
        checks: vec![status_check(999)], // synthetic request always reports 0, never matches
        extractors: Vec::new(),
        response_status: 200,
        response_headers: HeaderMap::new(),
        response_body: "ok".into(),
    }];

    let server = MockServer::start(defs, HashMap::new()).await.unwrap();
    let addr = server.addr;

    let client = reqwest::Client::new();
    let resp = client.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let reports = server.shutdown().await;
    let (_, status) = MockServer::reconcile(1, reports);
    assert_eq!(status, httpbench::engine::model::Status::Fail);
}

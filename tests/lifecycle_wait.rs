//! Integration tests for lifecycle waits: polling until running, typed
//! failures, and deadline behavior.

use std::time::Duration;

use pretty_assertions::assert_eq;
use sandkit::{FailureKind, SandboxClient, SandboxError, SandboxStatus, WaitOptions};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sandbox_json(status: &str) -> serde_json::Value {
    json!({
        "id": "sbx-1",
        "name": "demo",
        "docker_image": "python:3.11-slim",
        "cpu_cores": 1.0,
        "memory_gb": 2.0,
        "status": status,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z"
    })
}

async fn client_for(server: &MockServer) -> SandboxClient {
    SandboxClient::new(Some("test-key".to_string()), Some(server.uri()))
        .expect("client construction")
}

/// Mount `statuses` so each GET returns the next one, the last repeating.
async fn mount_status_sequence(server: &MockServer, statuses: &[&str]) {
    let (last, head) = statuses.split_last().expect("at least one status");
    for status in head {
        Mock::given(method("GET"))
            .and(path("/api/v1/sandboxes/sbx-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sandbox_json(status)))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/v1/sandboxes/sbx-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sandbox_json(last)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn wait_polls_until_running() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, &["PENDING", "PROVISIONING", "RUNNING"]).await;

    let client = client_for(&server).await;
    let sandbox = client
        .wait_until(
            "sbx-1",
            |s| s.status == SandboxStatus::Running,
            WaitOptions::new(Duration::from_secs(30)).interval(Duration::from_millis(10)),
        )
        .await
        .unwrap();
    assert_eq!(sandbox.status, SandboxStatus::Running);
}

#[tokio::test]
async fn wait_returns_immediately_when_predicate_already_holds() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, &["RUNNING"]).await;

    let client = client_for(&server).await;
    let started = std::time::Instant::now();
    let sandbox = client
        .wait_for_creation("sbx-1", Duration::from_secs(300))
        .await
        .unwrap();
    assert_eq!(sandbox.status, SandboxStatus::Running);
    // One poll, no sleep: nowhere near the 1s default interval.
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn wait_fails_typed_when_sandbox_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sandboxes/sbx-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sbx-1",
            "name": "demo",
            "docker_image": "python:3.11-slim",
            "cpu_cores": 1.0,
            "memory_gb": 2.0,
            "status": "ERROR",
            "error_type": "OOM_KILLED",
            "error_message": "container exceeded memory limit",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    match client
        .wait_for_creation("sbx-1", Duration::from_secs(30))
        .await
        .unwrap_err()
    {
        SandboxError::ResourceFailed {
            id,
            status,
            kind,
            message,
        } => {
            assert_eq!(id, "sbx-1");
            assert_eq!(status, SandboxStatus::Error);
            assert_eq!(kind, FailureKind::OomKilled);
            assert!(message.contains("memory limit"));
        }
        other => panic!("expected ResourceFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn wait_times_out_with_last_observed_status() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, &["PENDING"]).await;

    let client = client_for(&server).await;
    match client
        .wait_until(
            "sbx-1",
            |s| s.status == SandboxStatus::Running,
            WaitOptions::new(Duration::from_millis(50)).interval(Duration::from_millis(10)),
        )
        .await
        .unwrap_err()
    {
        SandboxError::Timeout {
            waited,
            last_status,
        } => {
            assert!(waited >= Duration::from_millis(50));
            assert_eq!(last_status, Some(SandboxStatus::Pending));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn waiting_for_a_terminal_state_does_not_trip_the_failure_path() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, &["RUNNING", "TERMINATED"]).await;

    let client = client_for(&server).await;
    let sandbox = client
        .wait_until(
            "sbx-1",
            |s| s.status == SandboxStatus::Terminated,
            WaitOptions::new(Duration::from_secs(30)).interval(Duration::from_millis(10)),
        )
        .await
        .unwrap();
    assert_eq!(sandbox.status, SandboxStatus::Terminated);
}

#[tokio::test]
async fn bulk_wait_isolates_per_sandbox_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sandboxes/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ok",
            "name": "demo",
            "docker_image": "python:3.11-slim",
            "cpu_cores": 1.0,
            "memory_gb": 2.0,
            "status": "RUNNING",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sandboxes/dead"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "dead",
            "name": "demo",
            "docker_image": "python:3.11-slim",
            "cpu_cores": 1.0,
            "memory_gb": 2.0,
            "status": "ERROR",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let ids = vec!["ok".to_string(), "dead".to_string()];
    let mut result = client
        .bulk_wait_for_creation(&ids, Duration::from_secs(30), 4)
        .await;

    assert_eq!(result.len(), 2);
    assert!(result.remove("ok").unwrap().is_ok());
    assert!(matches!(
        result.remove("dead").unwrap().unwrap_err(),
        SandboxError::ResourceFailed { .. }
    ));
}

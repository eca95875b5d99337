//! The blocking client must behave identically to the async client it
//! wraps: same paths, same auth, same error mapping.

use pretty_assertions::assert_eq;
use sandkit::SandboxError;
use sandkit::blocking::SandboxClient;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The mock server needs a live async runtime; keep one alive for the
/// duration of the test while the blocking client drives its own.
fn with_mock_server<F>(test: F)
where
    F: FnOnce(&MockServer),
{
    let rt = tokio::runtime::Runtime::new().expect("test runtime");
    let server = rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/sandboxes/sbx-1"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sbx-1",
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
            .and(path("/api/v1/sandboxes/gone"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "no such sandbox"})),
            )
            .mount(&server)
            .await;
        server
    });
    test(&server);
    drop(server);
}

#[test]
fn blocking_get_returns_descriptor() {
    with_mock_server(|server| {
        let client =
            SandboxClient::new(Some("test-key".to_string()), Some(server.uri())).unwrap();
        let sandbox = client.get("sbx-1").unwrap();
        assert_eq!(sandbox.id, "sbx-1");
        assert_eq!(sandbox.status, sandkit::SandboxStatus::Running);
    });
}

#[test]
fn blocking_errors_map_like_async() {
    with_mock_server(|server| {
        let client =
            SandboxClient::new(Some("test-key".to_string()), Some(server.uri())).unwrap();
        assert!(matches!(
            client.get("gone").unwrap_err(),
            SandboxError::NotFound { .. }
        ));
    });
}

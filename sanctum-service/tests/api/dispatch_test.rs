use crate::harness::{send, send_with_headers, server, ADMIN};
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn unknown_identity_is_denied_before_any_handler() {
    let server = server().await;
    for (method, path) in
        [("POST", "/v1/key/create/k1"), ("GET", "/v1/key/list/*"), ("GET", "/v1/status"), ("GET", "/v1/log/audit/trace")]
    {
        let response = send(&server, method, path, None, None).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "{method} {path}");
    }
}

#[tokio::test]
async fn path_normalization_rejects_dot_segments_and_double_slashes() {
    let server = server().await;
    for path in ["/v1/../v1/status", "/v1/./status", "/v1//status", "/v1/key/create/.."] {
        let response = send(&server, "GET", path, Some(ADMIN), None).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{path}");
    }
}

#[tokio::test]
async fn method_mismatch_is_405() {
    let server = server().await;
    let response = send(&server, "GET", "/v1/key/create/k1", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    let response = send(&server, "POST", "/v1/policy/read/p", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn method_check_precedes_authorization() {
    let server = server().await;
    // Even an unauthenticated caller sees the method mismatch, not 403.
    let response = send(&server, "GET", "/v1/key/create/k1", None, None).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    // With the right method the same caller is denied.
    let response = send(&server, "POST", "/v1/key/create/k1", None, None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_enclave_is_not_found() {
    let server = server().await;
    let response =
        send_with_headers(&server, "GET", "/v1/status", Some(ADMIN), None, &[("x-enclave", "ghost")]).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    // Empty selector falls back to the default enclave.
    let response = send_with_headers(&server, "GET", "/v1/status", Some(ADMIN), None, &[("x-enclave", "")]).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn public_endpoints_need_no_identity() {
    let server = server().await;

    let response = send(&server, "GET", "/version", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["version"].as_str().unwrap(), env!("CARGO_PKG_VERSION"));

    let response = send(&server, "GET", "/metrics", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text().contains("http_requests_total"));

    let response = send(&server, "GET", "/v1/ready", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn ready_endpoint_is_absent_unless_enabled() {
    let server = crate::harness::server_with(|config| config.api.ready = false).await;
    let response = send(&server, "GET", "/v1/ready", None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_assign_body_is_rejected() {
    let server = server().await;
    let big = "x".repeat(4096);
    let response = send(
        &server,
        "POST",
        "/v1/identity/assign/p",
        Some(ADMIN),
        Some(json!({ "identity": big })),
    )
    .await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn status_reports_keystore_health() {
    let server = server().await;
    let response = send(&server, "GET", "/v1/status", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK);
    let status = response.json();
    assert_eq!(status["keystore"]["state"].as_str().unwrap(), "available");
    assert_eq!(status["keystore"]["backend"].as_str().unwrap(), "mem");
}

#[tokio::test]
async fn every_request_emits_one_audit_record() {
    let server = server().await;
    let mut records = server.state.audit.subscribe();

    let response = send(&server, "POST", "/v1/key/create/audited", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK);

    let record = records.recv().await.expect("audit record");
    assert_eq!(record.request.path, "/v1/key/create/audited");
    assert_eq!(record.request.identity, ADMIN);
    assert_eq!(record.request.enclave, "default");
    assert_eq!(record.response.status, 200);

    // Denied requests audit too.
    let response = send(&server, "POST", "/v1/key/create/audited2", None, None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let record = records.recv().await.expect("audit record");
    assert_eq!(record.response.status, 403);
    assert_eq!(record.request.identity, "unknown");
}

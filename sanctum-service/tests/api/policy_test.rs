use crate::harness::{bind_policy, send, server, ADMIN};
use axum::http::StatusCode;
use serde_json::json;

const CLIENT: &str = "5bc122ae8c4b4074ffebcebe3a06b83a7209d4e0c1a54e8b24ba76a674b3e1ca";

#[tokio::test]
async fn deny_dominates_allow() {
    let server = server().await;
    bind_policy(&server, "ro", &["/v1/key/decrypt/x*"], &["/v1/key/decrypt/x-secret"], CLIENT).await;

    // Denied path: 403 before the handler ever runs.
    let response = send(&server, "POST", "/v1/key/decrypt/x-secret", Some(CLIENT), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // Allowed path reaches the handler (which then wants a body).
    let response = send(&server, "POST", "/v1/key/decrypt/x-public", Some(CLIENT), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // Paths outside the allow list are denied.
    let response = send(&server, "DELETE", "/v1/key/delete/x-public", Some(CLIENT), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn allowed_client_can_decrypt() {
    let server = server().await;
    bind_policy(&server, "ro", &["/v1/key/decrypt/*"], &[], CLIENT).await;

    send(&server, "POST", "/v1/key/create/k1", Some(ADMIN), None).await;
    let response = send(
        &server,
        "POST",
        "/v1/key/generate/k1",
        Some(ADMIN),
        Some(json!({ "context": { "tenant": "a" } })),
    )
    .await;
    let generated = response.json();

    let response = send(
        &server,
        "POST",
        "/v1/key/decrypt/k1",
        Some(CLIENT),
        Some(json!({ "ciphertext": generated["ciphertext"], "context": { "tenant": "a" } })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    assert_eq!(generated["plaintext"], response.json()["plaintext"]);
}

#[tokio::test]
async fn denials_do_not_reveal_existence() {
    let server = server().await;
    send(&server, "POST", "/v1/key/create/existing", Some(ADMIN), None).await;

    let on_existing = send(&server, "POST", "/v1/key/decrypt/existing", Some(CLIENT), None).await;
    let on_missing = send(&server, "POST", "/v1/key/decrypt/missing", Some(CLIENT), None).await;
    assert_eq!(on_existing.status, StatusCode::FORBIDDEN);
    assert_eq!(on_missing.status, StatusCode::FORBIDDEN);
    assert_eq!(on_existing.json(), on_missing.json());
}

#[tokio::test]
async fn describe_and_read_policy() {
    let server = server().await;
    bind_policy(&server, "ops", &["/v1/key/create/*"], &["/v1/key/create/prod-*"], CLIENT).await;

    let response = send(&server, "GET", "/v1/policy/describe/ops", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK);
    let described = response.json();
    assert_eq!(described["created_by"].as_str().unwrap(), ADMIN);
    assert!(described["created_at"].is_string());
    assert!(described.get("allow").is_none());

    let response = send(&server, "GET", "/v1/policy/read/ops", Some(ADMIN), None).await;
    let full = response.json();
    assert_eq!(full["allow"], json!(["/v1/key/create/*"]));
    assert_eq!(full["deny"], json!(["/v1/key/create/prod-*"]));
}

#[tokio::test]
async fn write_replaces_policy() {
    let server = server().await;
    bind_policy(&server, "p", &["/v1/key/decrypt/*"], &[], CLIENT).await;

    let response = send(&server, "POST", "/v1/key/decrypt/k", Some(CLIENT), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST); // authorized, bad body

    let response = send(
        &server,
        "POST",
        "/v1/policy/write/p",
        Some(ADMIN),
        Some(json!({ "allow": ["/v1/key/encrypt/*"] })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = send(&server, "POST", "/v1/key/decrypt/k", Some(CLIENT), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_policy_then_read_is_not_found() {
    let server = server().await;
    bind_policy(&server, "gone", &["/v1/status"], &[], CLIENT).await;

    let response = send(&server, "DELETE", "/v1/policy/delete/gone", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK);
    let response = send(&server, "GET", "/v1/policy/read/gone", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let response = send(&server, "DELETE", "/v1/policy/delete/gone", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    // The dangling binding no longer grants anything.
    let response = send(&server, "GET", "/v1/status", Some(CLIENT), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_policies_streams_ndjson() {
    let server = server().await;
    bind_policy(&server, "alpha", &["/v1/status"], &[], CLIENT).await;
    bind_policy(&server, "beta", &["/v1/status"], &[], "someone-else").await;

    let response = send(&server, "GET", "/v1/policy/list/*", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK);
    let names: Vec<String> =
        response.ndjson_lines().iter().map(|line| line["name"].as_str().unwrap().to_string()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
}

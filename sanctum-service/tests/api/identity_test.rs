use crate::harness::{bind_policy, send, server, ADMIN};
use axum::http::StatusCode;
use serde_json::json;

const CLIENT: &str = "0f21d0d71d6e3302fdf12d1b2435d0db37ee0cba85e1677014f8a315d528b661";

#[tokio::test]
async fn self_assign_is_forbidden() {
    let server = server().await;
    // CLIENT may manage identity assignments for policy "p".
    bind_policy(&server, "p", &["/v1/identity/assign/*"], &[], CLIENT).await;

    let response = send(
        &server,
        "POST",
        "/v1/identity/assign/p",
        Some(CLIENT),
        Some(json!({ "identity": CLIENT })),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.json()["message"].as_str().unwrap(), "identity cannot assign policy to itself");
}

#[tokio::test]
async fn assign_unknown_identity_is_a_bad_request() {
    let server = server().await;
    bind_policy(&server, "p", &["/v1/status"], &[], CLIENT).await;

    for identity in ["unknown", "", "   "] {
        let response = send(
            &server,
            "POST",
            "/v1/identity/assign/p",
            Some(ADMIN),
            Some(json!({ "identity": identity })),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "identity {identity:?}");
    }
}

#[tokio::test]
async fn reassigning_bound_identity_conflicts_until_forgotten() {
    let server = server().await;
    bind_policy(&server, "p1", &["/v1/status"], &[], CLIENT).await;
    bind_policy(&server, "p2", &["/v1/status"], &[], "other-identity").await;

    let response =
        send(&server, "POST", "/v1/identity/assign/p2", Some(ADMIN), Some(json!({ "identity": CLIENT }))).await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = send(&server, "DELETE", &format!("/v1/identity/forget/{CLIENT}"), Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK);

    let response =
        send(&server, "POST", "/v1/identity/assign/p2", Some(ADMIN), Some(json!({ "identity": CLIENT }))).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn assign_to_missing_policy_is_not_found() {
    let server = server().await;
    let response =
        send(&server, "POST", "/v1/identity/assign/ghost", Some(ADMIN), Some(json!({ "identity": CLIENT }))).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forgotten_identity_loses_access() {
    let server = server().await;
    bind_policy(&server, "p", &["/v1/status"], &[], CLIENT).await;

    let response = send(&server, "GET", "/v1/status", Some(CLIENT), None).await;
    assert_eq!(response.status, StatusCode::OK);

    send(&server, "DELETE", &format!("/v1/identity/forget/{CLIENT}"), Some(ADMIN), None).await;
    let response = send(&server, "GET", "/v1/status", Some(CLIENT), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_identities_streams_bindings() {
    let server = server().await;
    bind_policy(&server, "p", &["/v1/status"], &[], CLIENT).await;

    let response = send(&server, "GET", "/v1/identity/list/*", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK);
    let lines = response.ndjson_lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["identity"].as_str().unwrap(), CLIENT);
    assert_eq!(lines[0]["policy"].as_str().unwrap(), "p");
}

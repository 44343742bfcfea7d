use crate::harness::{send, server, ADMIN};
use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

#[tokio::test]
async fn generate_then_decrypt_roundtrip_with_reordered_context() {
    let server = server().await;

    let response = send(&server, "POST", "/v1/key/create/k1", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());

    let response =
        send(&server, "POST", "/v1/key/generate/k1", Some(ADMIN), Some(json!({ "context": { "b": 1, "a": 2 } })))
            .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    let generated = response.json();
    let plaintext = generated["plaintext"].as_str().expect("plaintext");
    let ciphertext = generated["ciphertext"].as_str().expect("ciphertext");
    assert_eq!(STANDARD.decode(plaintext).unwrap().len(), 32);

    // Same context, different key order.
    let response = send(
        &server,
        "POST",
        "/v1/key/decrypt/k1",
        Some(ADMIN),
        Some(json!({ "ciphertext": ciphertext, "context": { "a": 2, "b": 1 } })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    assert_eq!(response.json()["plaintext"].as_str().unwrap(), plaintext);
}

#[tokio::test]
async fn decrypt_with_wrong_context_is_rejected() {
    let server = server().await;
    send(&server, "POST", "/v1/key/create/k1", Some(ADMIN), None).await;

    let response =
        send(&server, "POST", "/v1/key/generate/k1", Some(ADMIN), Some(json!({ "context": { "a": 1 } }))).await;
    let ciphertext = response.json()["ciphertext"].as_str().unwrap().to_string();

    let response = send(
        &server,
        "POST",
        "/v1/key/decrypt/k1",
        Some(ADMIN),
        Some(json!({ "ciphertext": ciphertext, "context": { "a": 2 } })),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn encrypt_decrypt_with_imported_key() {
    let server = server().await;
    let material = STANDARD.encode([7u8; 32]);
    let response =
        send(&server, "POST", "/v1/key/import/k-import", Some(ADMIN), Some(json!({ "bytes": material }))).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());

    let secret = STANDARD.encode(b"attack at dawn");
    let response =
        send(&server, "POST", "/v1/key/encrypt/k-import", Some(ADMIN), Some(json!({ "plaintext": secret }))).await;
    assert_eq!(response.status, StatusCode::OK);
    let ciphertext = response.json()["ciphertext"].as_str().unwrap().to_string();

    let response =
        send(&server, "POST", "/v1/key/decrypt/k-import", Some(ADMIN), Some(json!({ "ciphertext": ciphertext })))
            .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["plaintext"].as_str().unwrap(), secret);
}

#[tokio::test]
async fn create_existing_key_conflicts() {
    let server = server().await;
    send(&server, "POST", "/v1/key/create/k1", Some(ADMIN), None).await;
    let response = send(&server, "POST", "/v1/key/create/k1", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn deleted_key_is_not_found() {
    let server = server().await;
    send(&server, "POST", "/v1/key/create/k1", Some(ADMIN), None).await;
    let response = send(&server, "DELETE", "/v1/key/delete/k1", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK);
    // Idempotent delete.
    let response = send(&server, "DELETE", "/v1/key/delete/k1", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = send(&server, "POST", "/v1/key/generate/k1", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_key_names_rejected() {
    let server = server().await;
    for name in ["bad%20name", "x".repeat(81).as_str()] {
        let response = send(&server, "POST", &format!("/v1/key/create/{name}"), Some(ADMIN), None).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{name}");
    }
}

#[tokio::test]
async fn list_keys_streams_ndjson_filtered_by_pattern() {
    let server = server().await;
    for name in ["alpha", "beta", "alte"] {
        send(&server, "POST", &format!("/v1/key/create/{name}"), Some(ADMIN), None).await;
    }

    let response = send(&server, "GET", "/v1/key/list/al*", Some(ADMIN), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers["content-type"], "application/x-ndjson");

    let mut names: Vec<String> = response
        .ndjson_lines()
        .iter()
        .map(|line| line["name"].as_str().expect("name").to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["alpha", "alte"]);
    for line in response.ndjson_lines() {
        assert!(line["created_at"].is_string());
    }
}

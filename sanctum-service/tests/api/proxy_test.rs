use crate::harness::{send_with_headers, server_with};
use axum::http::StatusCode;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

const PROXY: &str = "c2a1afb92555c9ba4a4c7ce7cbeeb73aec4408bdbe5868c8e0f3ae22f8acd713";

// Matches the forwarded certificate below (sha256 over its DER SPKI).
const FORWARDED_IDENTITY: &str = "930a2490604a9bd20ae68915e90bf3f14b17a96515ec09d1dc495d7637098fcf";

const FORWARDED_CERT_PEM: &str = "-----BEGIN CERTIFICATE-----
MIIBeTCCAR+gAwIBAgIUUBxuEurJVujjpeC/mUeU9M15pMowCgYIKoZIzj0EAwIw
EjEQMA4GA1UEAwwHc2FuY3R1bTAeFw0yNjA4MDIwNTMzMTRaFw0zNjA3MzAwNTMz
MTRaMBIxEDAOBgNVBAMMB3NhbmN0dW0wWTATBgcqhkjOPQIBBggqhkjOPQMBBwNC
AARw+8qmHeoCUmQ1m7VGDbR+U2ihR1vs9e17+uWsZ51UCNNSeUS/y9eygd2/pmTB
A9fkdmQMdktj+cq7ERe/Qmlyo1MwUTAdBgNVHQ4EFgQUmwlJ8OJuM3FOw4fodWN0
RKHT7F4wHwYDVR0jBBgwFoAUmwlJ8OJuM3FOw4fodWN0RKHT7F4wDwYDVR0TAQH/
BAUwAwEB/zAKBggqhkjOPQQDAgNIADBFAiEAiC2omuIL/nWJikyUHj9kfXPHp4g2
OBfpeQ3qO7NrCwoCIAHNPvmKmTe46bI6QXrMglCT8zQqHEzK128xOC5Cryi0
-----END CERTIFICATE-----
";

fn encoded_cert() -> String {
    utf8_percent_encode(FORWARDED_CERT_PEM, NON_ALPHANUMERIC).to_string()
}

#[tokio::test]
async fn proxy_replaces_identity_with_forwarded_certificate() {
    // The forwarded client is the admin; the proxy itself is not.
    let server = server_with(|config| {
        config.admin.identity = Some(FORWARDED_IDENTITY.to_string());
        config.tls.proxy.identities = vec![PROXY.to_string()];
    })
    .await;

    let response = send_with_headers(
        &server,
        "GET",
        "/v1/status",
        Some(PROXY),
        None,
        &[("X-Tls-Client-Cert", &encoded_cert())],
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
}

#[tokio::test]
async fn proxy_without_forwarded_certificate_is_a_bad_request() {
    let server = server_with(|config| {
        config.tls.proxy.identities = vec![PROXY.to_string()];
    })
    .await;

    let response = send_with_headers(&server, "GET", "/v1/status", Some(PROXY), None, &[]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proxy_with_malformed_certificate_is_a_bad_request() {
    let server = server_with(|config| {
        config.tls.proxy.identities = vec![PROXY.to_string()];
    })
    .await;

    let response = send_with_headers(
        &server,
        "GET",
        "/v1/status",
        Some(PROXY),
        None,
        &[("X-Tls-Client-Cert", "not%20a%20certificate")],
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forwarded_certificate_from_non_proxy_is_ignored() {
    let server = server_with(|config| {
        config.admin.identity = Some(FORWARDED_IDENTITY.to_string());
    })
    .await;

    // Not in the proxy set: the header must not escalate the caller.
    let response = send_with_headers(
        &server,
        "GET",
        "/v1/status",
        Some("random-client"),
        None,
        &[("X-Tls-Client-Cert", &encoded_cert())],
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn custom_proxy_header_is_honored() {
    let server = server_with(|config| {
        config.admin.identity = Some(FORWARDED_IDENTITY.to_string());
        config.tls.proxy.identities = vec![PROXY.to_string()];
        config.tls.proxy.header.cert = "X-Forwarded-Client-Cert".to_string();
    })
    .await;

    let response = send_with_headers(
        &server,
        "GET",
        "/v1/status",
        Some(PROXY),
        None,
        &[("X-Forwarded-Client-Cert", &encoded_cert())],
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());

    // The default header name is no longer honored.
    let response = send_with_headers(
        &server,
        "GET",
        "/v1/status",
        Some(PROXY),
        None,
        &[("X-Tls-Client-Cert", &encoded_cert())],
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

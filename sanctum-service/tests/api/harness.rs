//! Drives the router directly, standing in for the TLS layer by
//! injecting the peer extension a real connection would carry.

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use sanctum_core::domain::Identity;
use sanctum_core::infrastructure::config::ServerConfig;
use sanctum_service::api::{Peer, SharedState};
use sanctum_service::service::bootstrap;
use tower::ServiceExt;

pub const ADMIN: &str = "11f1fabb57b7fdf22b9d03fd3b8b8e5b53d3f254577d8e70bd74cbaa07d5bfae";

pub struct TestServer {
    pub state: SharedState,
    pub router: Router,
}

/// Memory-backed server with `ADMIN` as the admin identity.
pub async fn server() -> TestServer {
    server_with(|_| {}).await
}

pub async fn server_with(customize: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let mut config = ServerConfig::default();
    config.admin.identity = Some(ADMIN.to_string());
    config.api.ready = true;
    customize(&mut config);
    config.validate().expect("test config");
    let (state, router) = bootstrap::build(&config).await.expect("bootstrap");
    TestServer { state, router }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.bytes).unwrap_or(serde_json::Value::Null)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Parses an ND-JSON body into its lines.
    pub fn ndjson_lines(&self) -> Vec<serde_json::Value> {
        self.text()
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).expect("ndjson line"))
            .collect()
    }
}

/// Sends one request as `identity`. `identity: None` models a connection
/// that presented no client certificate at all.
pub async fn send(
    server: &TestServer,
    method: &str,
    path: &str,
    identity: Option<&str>,
    body: Option<serde_json::Value>,
) -> TestResponse {
    send_with_headers(server, method, path, identity, body, &[]).await
}

pub async fn send_with_headers(
    server: &TestServer,
    method: &str,
    path: &str,
    identity: Option<&str>,
    body: Option<serde_json::Value>,
    headers: &[(&str, &str)],
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(path);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let body = match body {
        Some(value) => Body::from(serde_json::to_string(&value).expect("serialize body")),
        None => Body::empty(),
    };
    let mut request = builder.body(body).expect("request");
    request.extensions_mut().insert(Peer {
        addr: "127.0.0.1:40001".parse().expect("addr"),
        identity: identity.map(Identity::new).unwrap_or_else(Identity::unknown),
    });

    let response = server.router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body").to_vec();
    TestResponse { status, headers, bytes }
}

/// Admin writes a policy and binds `identity` to it.
pub async fn bind_policy(server: &TestServer, policy: &str, allow: &[&str], deny: &[&str], identity: &str) {
    let response = send(
        server,
        "POST",
        &format!("/v1/policy/write/{policy}"),
        Some(ADMIN),
        Some(serde_json::json!({ "allow": allow, "deny": deny })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "write policy: {}", response.text());

    let response = send(
        server,
        "POST",
        &format!("/v1/identity/assign/{policy}"),
        Some(ADMIN),
        Some(serde_json::json!({ "identity": identity })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "assign: {}", response.text());
}

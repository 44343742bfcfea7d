use crate::api::error::ApiError;
use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sanctum_core::KesError;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// The live audit stream is the one route that carries no deadline.
pub const AUDIT_TRACE_PATH: &str = "/v1/log/audit/trace";

/// Hard per-request deadline, applied to every route except the audit
/// trace. Expiry cancels the handler (the future is dropped) and answers
/// 503. Streaming bodies are unaffected once the response headers are
/// out.
pub async fn timeout_middleware(req: Request<Body>, next: Next) -> Response {
    if req.uri().path() == AUDIT_TRACE_PATH {
        return next.run(req).await;
    }
    match tokio::time::timeout(DEFAULT_TIMEOUT, next.run(req)).await {
        Ok(response) => response,
        Err(_) => ApiError::from(KesError::RequestTimeout { timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64 })
            .into_response(),
    }
}

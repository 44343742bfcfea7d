//! Version, metrics, readiness, status and the audit trace stream.

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::SharedState;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures::{Stream, StreamExt};
use sanctum_core::application::Enclave;
use sanctum_core::infrastructure::keystore::StoreHealth;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "version": VERSION }))
}

pub async fn metrics_text(State(state): State<SharedState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => {
            let mut response = body.into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
            response
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn ready(State(state): State<SharedState>) -> Response {
    let state_info = state.registry.default_enclave().status().await;
    match state_info.health {
        StoreHealth::Available => (StatusCode::OK, "ready").into_response(),
        StoreHealth::Unreachable => (StatusCode::SERVICE_UNAVAILABLE, "key store unreachable").into_response(),
    }
}

pub async fn status(
    State(state): State<SharedState>,
    Extension(enclave): Extension<Arc<Enclave>>,
) -> ApiResult<Json<serde_json::Value>> {
    let store_state = enclave.status().await;
    let health = match store_state.health {
        StoreHealth::Available => "available",
        StoreHealth::Unreachable => "unreachable",
    };
    Ok(Json(serde_json::json!({
        "version": VERSION,
        "uptime_s": state.uptime_secs(),
        "keystore": {
            "backend": enclave.backend(),
            "state": health,
            "latency_ms": store_state.latency.as_millis() as u64,
        },
    })))
}

/// Server-sent stream of audit records. No timeout applies; the stream
/// lives until the client disconnects.
pub async fn audit_trace(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.audit.subscribe()).filter_map(|record| async move {
        match record {
            Ok(record) => Event::default().json_data(&record).ok().map(Ok),
            // A lagged subscriber skips dropped records and carries on.
            Err(_) => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

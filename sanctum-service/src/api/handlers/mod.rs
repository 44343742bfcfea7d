pub mod identities;
pub mod keys;
pub mod policies;
pub mod system;

use crate::api::error::ApiError;
use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{Stream, StreamExt};
use sanctum_core::KesError;
use serde::de::DeserializeOwned;
use std::convert::Infallible;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Parses a JSON body; an empty body yields the type's default.
fn parse_json<T: DeserializeOwned + Default>(bytes: &Bytes) -> Result<T, KesError> {
    if bytes.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|err| KesError::malformed(format!("invalid JSON body: {err}")))
}

/// Parses a JSON body that must be present.
fn parse_json_required<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, KesError> {
    if bytes.is_empty() {
        return Err(KesError::malformed("request body required"));
    }
    serde_json::from_slice(bytes).map_err(|err| KesError::malformed(format!("invalid JSON body: {err}")))
}

fn decode_base64(value: &str, field: &str) -> Result<Vec<u8>, KesError> {
    STANDARD.decode(value).map_err(|err| KesError::malformed(format!("invalid base64 in {field}: {err}")))
}

fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// ND-JSON response: one line per entry, a final `{"error":…}` line on
/// mid-stream failure.
fn ndjson<S>(lines: S) -> Response
where
    S: Stream<Item = String> + Send + 'static,
{
    let body = Body::from_stream(lines.map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], body).into_response()
}

fn error_line(err: KesError) -> String {
    let message = ApiError(err).message();
    format!("{}\n", serde_json::json!({ "error": message }))
}

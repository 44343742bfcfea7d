//! Maps core errors onto the stable HTTP status taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sanctum_core::foundation::ErrorCode;
use sanctum_core::KesError;

/// A handler error on its way out. Raw backend errors never reach the
/// client; the status and message come from the error code alone.
#[derive(Debug)]
pub struct ApiError(pub KesError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.code() {
            ErrorCode::InvalidName
            | ErrorCode::InvalidPattern
            | ErrorCode::InvalidPath
            | ErrorCode::MalformedRequest
            | ErrorCode::MalformedCertificate
            | ErrorCode::UnknownIdentity => StatusCode::BAD_REQUEST,
            // Decrypt failures report 400, matching what existing clients
            // expect for unprocessable ciphertext.
            ErrorCode::DecryptFailed => StatusCode::BAD_REQUEST,
            ErrorCode::NotAuthorized | ErrorCode::SelfAssign => StatusCode::FORBIDDEN,
            ErrorCode::KeyNotFound | ErrorCode::PolicyNotFound | ErrorCode::EnclaveNotFound => StatusCode::NOT_FOUND,
            ErrorCode::KeyExists | ErrorCode::IdentityAlreadyAssigned => StatusCode::CONFLICT,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::StoreUnavailable | ErrorCode::RequestTimeout => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::StoreError
            | ErrorCode::CryptoError
            | ErrorCode::SerializationError
            | ErrorCode::ConfigError
            | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn message(&self) -> String {
        match self.status() {
            // Internal details stay in the logs.
            StatusCode::INTERNAL_SERVER_ERROR => "internal server error".to_string(),
            StatusCode::SERVICE_UNAVAILABLE => "service unavailable".to_string(),
            _ => self.0.to_string(),
        }
    }
}

impl From<KesError> for ApiError {
    fn from(err: KesError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("request failed status={} error={}", status.as_u16(), self.0);
        }
        (status, Json(serde_json::json!({ "message": self.message() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

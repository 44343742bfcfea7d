use std::io;
use thiserror::Error;

/// Stable discriminant for every [`KesError`] variant.
///
/// The API layer maps codes to HTTP statuses; everything else matches on
/// the variant itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidName,
    InvalidPattern,
    InvalidPath,
    MalformedRequest,
    MalformedCertificate,
    UnknownIdentity,
    NotAuthorized,
    SelfAssign,
    KeyNotFound,
    KeyExists,
    PolicyNotFound,
    EnclaveNotFound,
    IdentityAlreadyAssigned,
    PayloadTooLarge,
    DecryptFailed,
    StoreUnavailable,
    StoreError,
    CryptoError,
    SerializationError,
    RequestTimeout,
    ConfigError,
    Internal,
}

#[derive(Debug, Error)]
pub enum KesError {
    #[error("invalid key name: {0}")]
    InvalidName(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid request path: {0}")]
    InvalidPath(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("identity is unknown")]
    UnknownIdentity,

    #[error("not authorized: insufficient permissions")]
    NotAuthorized,

    #[error("identity cannot assign policy to itself")]
    SelfAssign,

    #[error("key does not exist: {0}")]
    KeyNotFound(String),

    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("policy does not exist: {0}")]
    PolicyNotFound(String),

    #[error("enclave does not exist: {0}")]
    EnclaveNotFound(String),

    #[error("identity already assigned: identity={identity} policy={policy}")]
    IdentityAlreadyAssigned { identity: String, policy: String },

    #[error("payload too large: {size} exceeds max {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("decryption failed: ciphertext is not authentic")]
    DecryptFailed,

    #[error("key store unavailable: {backend} - {details}")]
    StoreUnavailable {
        backend: &'static str,
        details: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("key store error during {operation}: {details}")]
    StoreError {
        operation: String,
        details: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("crypto error during {operation}: {details}")]
    CryptoError { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("request timed out after {timeout_ms}ms")]
    RequestTimeout { timeout_ms: u64 },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, KesError>;

impl KesError {
    pub fn code(&self) -> ErrorCode {
        match self {
            KesError::InvalidName(_) => ErrorCode::InvalidName,
            KesError::InvalidPattern(_) => ErrorCode::InvalidPattern,
            KesError::InvalidPath(_) => ErrorCode::InvalidPath,
            KesError::MalformedRequest(_) => ErrorCode::MalformedRequest,
            KesError::MalformedCertificate(_) => ErrorCode::MalformedCertificate,
            KesError::UnknownIdentity => ErrorCode::UnknownIdentity,
            KesError::NotAuthorized => ErrorCode::NotAuthorized,
            KesError::SelfAssign => ErrorCode::SelfAssign,
            KesError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            KesError::KeyExists(_) => ErrorCode::KeyExists,
            KesError::PolicyNotFound(_) => ErrorCode::PolicyNotFound,
            KesError::EnclaveNotFound(_) => ErrorCode::EnclaveNotFound,
            KesError::IdentityAlreadyAssigned { .. } => ErrorCode::IdentityAlreadyAssigned,
            KesError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            KesError::DecryptFailed => ErrorCode::DecryptFailed,
            KesError::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            KesError::StoreError { .. } => ErrorCode::StoreError,
            KesError::CryptoError { .. } => ErrorCode::CryptoError,
            KesError::SerializationError { .. } => ErrorCode::SerializationError,
            KesError::RequestTimeout { .. } => ErrorCode::RequestTimeout,
            KesError::ConfigError(_) => ErrorCode::ConfigError,
            KesError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn key_not_found(name: impl Into<String>) -> Self {
        KesError::KeyNotFound(name.into())
    }

    pub fn key_exists(name: impl Into<String>) -> Self {
        KesError::KeyExists(name.into())
    }

    pub fn policy_not_found(name: impl Into<String>) -> Self {
        KesError::PolicyNotFound(name.into())
    }

    pub fn store_unavailable(backend: &'static str, details: impl Into<String>) -> Self {
        KesError::StoreUnavailable { backend, details: details.into(), source: None }
    }

    pub fn store_error(operation: impl Into<String>, details: impl Into<String>) -> Self {
        KesError::StoreError { operation: operation.into(), details: details.into(), source: None }
    }

    pub fn crypto_error(operation: impl Into<String>, details: impl Into<String>) -> Self {
        KesError::CryptoError { operation: operation.into(), details: details.into() }
    }

    pub fn malformed(details: impl Into<String>) -> Self {
        KesError::MalformedRequest(details.into())
    }

    /// True when the error indicates the backend could not be reached at
    /// all, as opposed to reaching it and failing. The cache's offline
    /// tier keys off this distinction.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, KesError::StoreUnavailable { .. } | KesError::RequestTimeout { .. })
    }
}

impl From<io::Error> for KesError {
    fn from(err: io::Error) -> Self {
        KesError::StoreError { operation: "io".to_string(), details: err.to_string(), source: None }
    }
}

impl From<serde_json::Error> for KesError {
    fn from(err: serde_json::Error) -> Self {
        KesError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}

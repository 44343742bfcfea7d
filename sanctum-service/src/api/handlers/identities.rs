//! Identity → policy bindings.

use super::{ndjson, parse_json_required};
use crate::api::error::ApiResult;
use crate::api::middleware::authorize::CallerIdentity;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Extension;
use sanctum_core::application::Enclave;
use sanctum_core::domain::{Identity, Name, Pattern};
use sanctum_core::KesError;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
struct AssignRequest {
    identity: String,
}

pub async fn assign_identity(
    Extension(enclave): Extension<Arc<Enclave>>,
    Extension(CallerIdentity(caller)): Extension<CallerIdentity>,
    Path(policy): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let policy = Name::new(policy)?;
    let request: AssignRequest = parse_json_required(&body)?;
    let identity = Identity::new(request.identity.trim());
    if identity.is_unknown() {
        return Err(KesError::UnknownIdentity.into());
    }
    // The effective (post proxy-unwrap) caller may not bind itself.
    if caller.ct_eq(&identity) {
        return Err(KesError::SelfAssign.into());
    }
    enclave.assign_policy(&policy, &identity)?;
    Ok(StatusCode::OK)
}

pub async fn forget_identity(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(identity): Path<String>,
) -> ApiResult<StatusCode> {
    let identity = Identity::new(identity.trim());
    if identity.is_unknown() {
        return Err(KesError::UnknownIdentity.into());
    }
    enclave.forget_identity(&identity);
    Ok(StatusCode::OK)
}

pub async fn list_identities(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(pattern): Path<String>,
) -> ApiResult<Response> {
    let pattern = Pattern::new(pattern)?;
    let mut identities = enclave.list_identities();
    identities.retain(|(identity, _)| pattern.matches(identity.as_str()));
    identities.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));

    let lines: Vec<String> = identities
        .into_iter()
        .map(|(identity, policy)| {
            format!(
                "{}\n",
                serde_json::json!({
                    "identity": identity.as_str(),
                    "policy": policy.as_ref().map(|name| name.as_str()),
                })
            )
        })
        .collect();
    Ok(ndjson(futures::stream::iter(lines)))
}

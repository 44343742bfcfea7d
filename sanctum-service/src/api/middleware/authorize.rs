use crate::api::error::ApiError;
use crate::api::middleware::audit::IdentitySlot;
use crate::api::state::{Peer, SharedState, ENCLAVE_HEADER};
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use log::debug;
use sanctum_core::domain::Identity;

/// Effective caller identity, as seen by authorization. Handlers use it
/// for `created_by` metadata and the self-assign guard.
#[derive(Clone, Debug)]
pub struct CallerIdentity(pub Identity);

/// Resolves the target enclave and gates the request on its policy. A
/// denied request answers 403 without revealing whether any named object
/// exists.
pub async fn authorize_middleware(State(state): State<SharedState>, mut req: Request<Body>, next: Next) -> Response {
    let identity = req.extensions().get::<Peer>().map(|peer| peer.identity.clone()).unwrap_or_else(Identity::unknown);
    if let Some(slot) = req.extensions().get::<IdentitySlot>() {
        slot.record(identity.clone());
    }

    let selector = req
        .headers()
        .get(ENCLAVE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let enclave = match state.registry.resolve(selector) {
        Ok(enclave) => enclave,
        Err(err) => return ApiError::from(err).into_response(),
    };

    if let Err(err) = enclave.verify_request(&identity, req.uri().path()) {
        debug!("request denied identity={} path={} enclave={}", identity, req.uri().path(), enclave.name());
        return ApiError::from(err).into_response();
    }

    req.extensions_mut().insert(CallerIdentity(identity));
    req.extensions_mut().insert(enclave);
    next.run(req).await
}

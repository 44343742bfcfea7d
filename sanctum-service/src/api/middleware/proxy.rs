use crate::api::error::ApiError;
use crate::api::state::{Peer, SharedState};
use crate::api::tls;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use log::debug;
use percent_encoding::percent_decode_str;
use sanctum_core::KesError;

/// When the TLS peer is a configured proxy, the effective identity is
/// re-derived from the client certificate the proxy forwards in the
/// configured header. Malformed forwarded certificates are a 400.
pub async fn proxy_middleware(State(state): State<SharedState>, mut req: Request<Body>, next: Next) -> Response {
    let Some(peer) = req.extensions().get::<Peer>().cloned() else {
        return next.run(req).await;
    };
    if !state.is_proxy(&peer.identity) {
        return next.run(req).await;
    }

    let identity = match forwarded_identity(&state, &req) {
        Ok(identity) => identity,
        Err(err) => return ApiError::from(err).into_response(),
    };
    debug!("proxy unwrapped client identity proxy={} client={}", peer.identity, identity);
    req.extensions_mut().insert(Peer { addr: peer.addr, identity });
    next.run(req).await
}

fn forwarded_identity(
    state: &SharedState,
    req: &Request<Body>,
) -> Result<sanctum_core::domain::Identity, KesError> {
    let header = HeaderName::try_from(state.proxy_cert_header.as_str())
        .map_err(|_| KesError::MalformedCertificate("invalid proxy header name".to_string()))?;
    let value = req
        .headers()
        .get(&header)
        .ok_or_else(|| KesError::MalformedCertificate("missing forwarded client certificate".to_string()))?;
    let encoded = value
        .to_str()
        .map_err(|_| KesError::MalformedCertificate("forwarded certificate is not valid ASCII".to_string()))?;
    let pem = percent_decode_str(encoded)
        .decode_utf8()
        .map_err(|_| KesError::MalformedCertificate("forwarded certificate is not valid UTF-8".to_string()))?;
    tls::identity_from_pem(pem.as_bytes())
}

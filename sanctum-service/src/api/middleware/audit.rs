use crate::api::state::{Peer, SharedState, ENCLAVE_HEADER};
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use sanctum_core::application::DEFAULT_ENCLAVE;
use sanctum_core::domain::Identity;
use sanctum_core::foundation::now_utc;
use sanctum_core::infrastructure::audit::{AuditRecord, AuditRequest, AuditResponse};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Shared slot the inner layers fill with the effective (post-proxy)
/// identity, so the audit record reflects what authorization saw.
#[derive(Clone, Default)]
pub struct IdentitySlot(Arc<OnceLock<Identity>>);

impl IdentitySlot {
    pub fn record(&self, identity: Identity) {
        let _ = self.0.set(identity);
    }

    pub fn get(&self) -> Option<&Identity> {
        self.0.get()
    }
}

/// Outermost layer: exactly one audit record per request, regardless of
/// outcome.
pub async fn audit_middleware(State(state): State<SharedState>, mut req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let path = req.uri().path().to_string();
    let ip = req.extensions().get::<Peer>().map(|peer| peer.addr.ip().to_string()).unwrap_or_default();
    let fallback_identity =
        req.extensions().get::<Peer>().map(|peer| peer.identity.clone()).unwrap_or_else(Identity::unknown);
    let enclave = req
        .headers()
        .get(ENCLAVE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_ENCLAVE)
        .to_string();

    let slot = IdentitySlot::default();
    req.extensions_mut().insert(slot.clone());

    let response = next.run(req).await;

    let identity = slot.get().cloned().unwrap_or(fallback_identity);
    state.audit.emit(AuditRecord {
        time: now_utc(),
        request: AuditRequest { ip, path, identity: identity.to_string(), enclave },
        response: AuditResponse {
            status: response.status().as_u16(),
            latency_ms: start.elapsed().as_millis() as u64,
        },
    });
    response
}

use sanctum_core::application::EnclaveRegistry;
use sanctum_core::domain::Identity;
use sanctum_core::infrastructure::audit::AuditHub;
use crate::service::metrics::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Per-connection peer information, inserted by the TLS accept loop (or
/// directly by tests). The proxy-unwrap middleware may replace the
/// identity with the forwarded client's.
#[derive(Clone, Debug)]
pub struct Peer {
    pub addr: SocketAddr,
    pub identity: Identity,
}

impl Peer {
    pub fn unauthenticated(addr: SocketAddr) -> Self {
        Self { addr, identity: Identity::unknown() }
    }
}

/// Header selecting the target enclave; absent means the default enclave.
pub const ENCLAVE_HEADER: &str = "x-enclave";

pub struct AppState {
    pub registry: EnclaveRegistry,
    pub audit: AuditHub,
    pub metrics: Metrics,
    /// TLS peers trusted to forward a client certificate.
    pub proxy_identities: Vec<Identity>,
    /// Header carrying the forwarded, URL-encoded PEM certificate.
    pub proxy_cert_header: String,
    /// Expose `/v1/ready` without authentication.
    pub ready_enabled: bool,
    pub started_at: Instant,
}

impl AppState {
    pub fn is_proxy(&self, identity: &Identity) -> bool {
        self.proxy_identities.iter().any(|proxy| proxy.ct_eq(identity))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

//! Wires configuration into a running enclave registry and router.

use crate::api::state::AppState;
use crate::api::{build_router, SharedState};
use crate::service::metrics::Metrics;
use axum::Router;
use log::{info, warn};
use sanctum_core::application::{Enclave, EnclaveRegistry, DEFAULT_ENCLAVE};
use sanctum_core::domain::{Identity, Name, Policy};
use sanctum_core::foundation::Result;
use sanctum_core::infrastructure::audit::AuditHub;
use sanctum_core::infrastructure::config::{KeystoreConfig, ServerConfig};
use sanctum_core::infrastructure::keystore::{FsStore, KeyStore, MemStore, PolicyMirror};
use std::sync::Arc;
use std::time::Instant;

pub async fn build(config: &ServerConfig) -> Result<(SharedState, Router)> {
    let (store, mirror): (Arc<dyn KeyStore>, Option<Arc<dyn PolicyMirror>>) = match config.keystore() {
        KeystoreConfig::Memory {} => {
            warn!("using the in-memory key store; keys will not survive a restart");
            (Arc::new(MemStore::new()), None)
        }
        KeystoreConfig::Fs { path } => {
            let store = FsStore::open(&path).await?;
            let mirror: Arc<dyn PolicyMirror> = Arc::new(store.mirror());
            (Arc::new(store), Some(mirror))
        }
    };

    let admin = config
        .admin
        .identity
        .as_deref()
        .map(str::trim)
        .filter(|identity| !identity.is_empty())
        .map(Identity::new);
    match &admin {
        Some(identity) => info!("admin identity configured identity={identity}"),
        None => info!("admin identity disabled"),
    }

    let enclave = Arc::new(Enclave::new(DEFAULT_ENCLAVE, store, config.cache_config(), admin.clone(), mirror));

    let warm_keys: Result<Vec<Name>> = config.keys.iter().map(|entry| Name::new(entry.name.as_str())).collect();
    enclave.start(&warm_keys?).await?;

    // Config-declared policies override whatever the mirror restored, and
    // their identity bindings are re-applied from scratch.
    let system_identity = admin.clone().unwrap_or_else(Identity::unknown);
    for (policy_name, policy_config) in &config.policy {
        let name = Name::new(policy_name.as_str())?;
        let policy =
            Policy::new(policy_config.allow.clone(), policy_config.deny.clone(), system_identity.clone());
        enclave.set_policy(&name, policy).await?;
        for identity in &policy_config.identities {
            let identity = Identity::new(identity.as_str());
            enclave.forget_identity(&identity);
            enclave.assign_policy(&name, &identity)?;
        }
        info!(
            "configured policy name={} identities={}",
            policy_name,
            policy_config.identities.len()
        );
    }

    let state = Arc::new(AppState {
        registry: EnclaveRegistry::new(enclave),
        audit: AuditHub::new(config.log.audit.enabled()),
        metrics: Metrics::new()?,
        proxy_identities: config.tls.proxy.identities.iter().map(|identity| Identity::new(identity.as_str())).collect(),
        proxy_cert_header: config.tls.proxy.header.cert.clone(),
        ready_enabled: config.api.ready,
        started_at: Instant::now(),
    });
    let router = build_router(state.clone());
    Ok((state, router))
}

//! TLS listener and per-connection serving.

use crate::api::state::Peer;
use crate::api::tls;
use axum::{Extension, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use log::{debug, error, info, warn};
use sanctum_core::domain::Identity;
use sanctum_core::foundation::{KesError, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

/// Accepts TLS connections and serves the router on each until `shutdown`
/// fires. Returns an error only on unrecoverable listener loss.
pub async fn serve(
    addr: SocketAddr,
    tls_config: Arc<rustls::ServerConfig>,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| KesError::ConfigError(format!("cannot bind {addr}: {err}")))?;
    let acceptor = TlsAcceptor::from(tls_config);
    info!("server listening addr={addr}");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("shutdown signal received, closing listener");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) if is_transient(&err) => {
                        warn!("transient accept error error={err}");
                        continue;
                    }
                    Err(err) => {
                        error!("listener failed error={err}");
                        return Err(KesError::Internal(format!("tls listener lost: {err}")));
                    }
                };
                let acceptor = acceptor.clone();
                let router = router.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, acceptor, router).await;
                });
            }
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, acceptor: TlsAcceptor, router: Router) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(tls_stream) => tls_stream,
        Err(err) => {
            debug!("tls handshake failed peer={peer_addr} error={err}");
            return;
        }
    };

    let identity = peer_identity(&tls_stream);
    debug!("connection established peer={peer_addr} identity={identity}");
    let app = router.layer(Extension(Peer { addr: peer_addr, identity }));
    let service = TowerToHyperService::new(app);

    if let Err(err) =
        auto::Builder::new(TokioExecutor::new()).serve_connection(TokioIo::new(tls_stream), service).await
    {
        debug!("connection closed peer={peer_addr} error={err}");
    }
}

fn peer_identity(tls_stream: &tokio_rustls::server::TlsStream<TcpStream>) -> Identity {
    let (_, connection) = tls_stream.get_ref();
    match connection.peer_certificates().and_then(|certs| certs.first()) {
        Some(cert) => tls::identity_from_cert_der(cert.as_ref()).unwrap_or_else(|err| {
            debug!("cannot derive peer identity error={err}");
            Identity::unknown()
        }),
        None => Identity::unknown(),
    }
}

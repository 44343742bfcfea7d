//! TLS setup and peer identity derivation.
//!
//! Trust is anchored in identities, not a PKI: the handshake accepts any
//! client certificate and authorization decides what the derived identity
//! may do. Connections without a certificate carry the unknown identity,
//! which only ever reaches the public endpoints.

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, SignatureScheme};
use sanctum_core::domain::Identity;
use sanctum_core::foundation::{KesError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

/// Lowercase hex SHA-256 over the DER-encoded `SubjectPublicKeyInfo` of
/// the leaf certificate.
pub fn identity_from_cert_der(der: &[u8]) -> Result<Identity> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|err| KesError::MalformedCertificate(format!("cannot parse certificate: {err}")))?;
    let digest = Sha256::digest(cert.tbs_certificate.subject_pki.raw);
    Ok(Identity::new(hex::encode(digest)))
}

/// Identity of a PEM-encoded certificate (the proxy-forwarded form).
pub fn identity_from_pem(pem: &[u8]) -> Result<Identity> {
    let (_, parsed) = x509_parser::pem::parse_x509_pem(pem)
        .map_err(|err| KesError::MalformedCertificate(format!("cannot parse PEM: {err}")))?;
    if parsed.label != "CERTIFICATE" {
        return Err(KesError::MalformedCertificate(format!("unexpected PEM label {:?}", parsed.label)));
    }
    identity_from_cert_der(&parsed.contents)
}

/// Builds the server TLS configuration: TLS 1.2+, client certificates
/// requested and accepted without chain validation.
pub fn server_config(cert_path: &Path, key_path: &Path, password: Option<&str>) -> Result<rustls::ServerConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path, password)?;

    let config = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
        .map_err(|err| KesError::ConfigError(format!("tls protocol setup failed: {err}")))?
        .with_client_cert_verifier(Arc::new(AcceptAnyClientCert { provider }))
        .with_single_cert(certs, key)
        .map_err(|err| KesError::ConfigError(format!("invalid tls certificate or key: {err}")))?;
    Ok(config)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = std::fs::read(path)
        .map_err(|err| KesError::ConfigError(format!("cannot read tls.cert {}: {err}", path.display())))?;
    let certs: std::result::Result<Vec<_>, _> = rustls_pemfile::certs(&mut data.as_slice()).collect();
    let certs = certs.map_err(|err| KesError::ConfigError(format!("invalid tls.cert: {err}")))?;
    if certs.is_empty() {
        return Err(KesError::ConfigError(format!("no certificates in {}", path.display())));
    }
    Ok(certs)
}

fn load_private_key(path: &Path, password: Option<&str>) -> Result<PrivateKeyDer<'static>> {
    let data = std::fs::read(path)
        .map_err(|err| KesError::ConfigError(format!("cannot read tls.key {}: {err}", path.display())))?;

    match password {
        Some(password) => decrypt_private_key(&data, password),
        None => rustls_pemfile::private_key(&mut data.as_slice())
            .map_err(|err| KesError::ConfigError(format!("invalid tls.key: {err}")))?
            .ok_or_else(|| KesError::ConfigError(format!("no private key in {}", path.display()))),
    }
}

/// Decrypts a password-protected PKCS#8 private key.
fn decrypt_private_key(pem: &[u8], password: &str) -> Result<PrivateKeyDer<'static>> {
    for entry in x509_parser::pem::Pem::iter_from_buffer(pem) {
        let entry = entry.map_err(|err| KesError::ConfigError(format!("invalid tls.key PEM: {err}")))?;
        if entry.label != "ENCRYPTED" && entry.label != "ENCRYPTED PRIVATE KEY" {
            continue;
        }
        let info = pkcs8::EncryptedPrivateKeyInfo::try_from(entry.contents.as_slice())
            .map_err(|err| KesError::ConfigError(format!("invalid encrypted private key: {err}")))?;
        let document = info
            .decrypt(password)
            .map_err(|_| KesError::ConfigError("tls.password does not decrypt tls.key".to_string()))?;
        return Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(document.as_bytes().to_vec())));
    }
    Err(KesError::ConfigError("tls.password set but tls.key holds no encrypted private key".to_string()))
}

/// Requests a client certificate and accepts whichever one is presented.
/// Authorization works on the derived identity; absent certificates fall
/// through as the unknown identity.
#[derive(Debug)]
struct AcceptAnyClientCert {
    provider: Arc<CryptoProvider>,
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

use crate::domain::Identity;
use crate::foundation::{now_utc, KesError, Result};
use crate::infrastructure::crypto::{Context, SealedObject};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use chacha20poly1305::ChaCha20Poly1305;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Largest plaintext a key will seal.
pub const MAX_WRAP_LEN: usize = 1 << 20;

const KEY_LEN: usize = 32;

/// AEAD algorithm bound to a key at creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl Algorithm {
    /// AES-256-GCM where the CPU has constant-time AES, ChaCha20-Poly1305
    /// everywhere else.
    pub fn preferred() -> Self {
        if has_aes_hardware() {
            Algorithm::Aes256Gcm
        } else {
            Algorithm::ChaCha20Poly1305
        }
    }

    /// Canonical on-the-wire algorithm tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Algorithm::Aes256Gcm => "AES-256-GCM-HMAC-SHA256",
            Algorithm::ChaCha20Poly1305 => "ChaCha20Poly1305",
        }
    }

    /// Resolves a wire tag, including the legacy spellings older clients
    /// still produce.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "AES-256-GCM-HMAC-SHA256" | "AES256-GCM_SHA256" => Some(Algorithm::Aes256Gcm),
            "ChaCha20Poly1305" | "ChaCha20-Poly1305" => Some(Algorithm::ChaCha20Poly1305),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(target_arch = "x86_64")]
fn has_aes_hardware() -> bool {
    std::arch::is_x86_feature_detected!("aes")
}

#[cfg(target_arch = "aarch64")]
fn has_aes_hardware() -> bool {
    std::arch::is_aarch64_feature_detected!("aes")
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn has_aes_hardware() -> bool {
    false
}

/// A named key's material plus metadata. The material never leaves this
/// type except through the seal/unseal/mac operations; it is wiped on
/// drop and redacted from debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretKey {
    #[serde(with = "material_base64")]
    bytes: [u8; KEY_LEN],
    pub algorithm: Algorithm,
    pub created_at: DateTime<Utc>,
    pub created_by: Identity,
}

impl SecretKey {
    /// Generates a fresh random key.
    pub fn generate(algorithm: Algorithm, created_by: Identity) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes, algorithm, created_at: now_utc(), created_by }
    }

    /// Builds a key from caller-provided material (the import path).
    pub fn from_bytes(material: &[u8], algorithm: Algorithm, created_by: Identity) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = material
            .try_into()
            .map_err(|_| KesError::malformed(format!("key material must be {KEY_LEN} bytes, got {}", material.len())))?;
        Ok(Self { bytes, algorithm, created_at: now_utc(), created_by })
    }

    /// AEAD-encrypts `plaintext` with `context` as associated data.
    ///
    /// A fresh 16-byte iv derives the per-message sealing key via
    /// HMAC-SHA-256; the AEAD runs under a fresh 12-byte nonce.
    pub fn seal(&self, plaintext: &[u8], context: &Context) -> Result<SealedObject> {
        if plaintext.len() > MAX_WRAP_LEN {
            return Err(KesError::PayloadTooLarge { size: plaintext.len(), max: MAX_WRAP_LEN });
        }
        let mut iv = [0u8; 16];
        let mut nonce = [0u8; 12];
        let mut rng = OsRng;
        rng.fill_bytes(&mut iv);
        rng.fill_bytes(&mut nonce);

        let mut sealing_key = self.derive_sealing_key(&iv);
        let aad = context.canonical_bytes()?;
        let payload = Payload { msg: plaintext, aad: &aad };
        let bytes = match self.algorithm {
            Algorithm::Aes256Gcm => Aes256Gcm::new(&sealing_key.into()).encrypt(Nonce::from_slice(&nonce), payload),
            Algorithm::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new(&sealing_key.into()).encrypt(Nonce::from_slice(&nonce), payload)
            }
        }
        .map_err(|_| KesError::crypto_error("seal", "aead encryption failed"))?;
        sealing_key.zeroize();

        Ok(SealedObject { algorithm: self.algorithm.tag().to_string(), iv, nonce, bytes })
    }

    /// Reverses [`SecretKey::seal`]. Fails with `DecryptFailed` when the
    /// container names a different algorithm, the tag does not verify, or
    /// the context differs from the one sealed with.
    pub fn unseal(&self, sealed: &SealedObject, context: &Context) -> Result<Vec<u8>> {
        match Algorithm::from_tag(&sealed.algorithm) {
            Some(algorithm) if algorithm == self.algorithm => {}
            _ => return Err(KesError::DecryptFailed),
        }

        let mut sealing_key = self.derive_sealing_key(&sealed.iv);
        let aad = context.canonical_bytes()?;
        let payload = Payload { msg: sealed.bytes.as_slice(), aad: &aad };
        let plaintext = match self.algorithm {
            Algorithm::Aes256Gcm => Aes256Gcm::new(&sealing_key.into()).decrypt(Nonce::from_slice(&sealed.nonce), payload),
            Algorithm::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new(&sealing_key.into()).decrypt(Nonce::from_slice(&sealed.nonce), payload)
            }
        }
        .map_err(|_| KesError::DecryptFailed);
        sealing_key.zeroize();
        plaintext
    }

    /// Keyed MAC over `data`, used for deterministic subkey derivation.
    pub fn mac(&self, data: &[u8]) -> [u8; 32] {
        let mut mac: HmacSha256 =
            Mac::new_from_slice(&self.bytes).expect("hmac accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    fn derive_sealing_key(&self, iv: &[u8; 16]) -> [u8; KEY_LEN] {
        self.mac(iv)
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .field("created_by", &self.created_by)
            .finish()
    }
}

mod material_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; super::KEY_LEN], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; super::KEY_LEN], D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = STANDARD.decode(&encoded).map_err(D::Error::custom)?;
        decoded.try_into().map_err(|_| D::Error::custom("key material must be 32 bytes"))
    }
}

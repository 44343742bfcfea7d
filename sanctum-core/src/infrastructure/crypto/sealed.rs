use crate::foundation::{KesError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Self-describing ciphertext container.
///
/// On the wire this is a compact JSON object `{alg, iv, nonce, bytes}`
/// with base64 fields. The writer always emits all four fields; the
/// reader also accepts the legacy form carrying only a 16-byte `iv`, in
/// which case the nonce is the leading 12 bytes of the iv.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedObject {
    pub algorithm: String,
    pub iv: [u8; 16],
    pub nonce: [u8; 12],
    pub bytes: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Wire {
    alg: String,
    iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    bytes: String,
}

impl SealedObject {
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let wire = Wire {
            alg: self.algorithm.clone(),
            iv: STANDARD.encode(self.iv),
            nonce: Some(STANDARD.encode(self.nonce)),
            bytes: STANDARD.encode(&self.bytes),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let wire: Wire =
            serde_json::from_slice(data).map_err(|err| KesError::malformed(format!("invalid ciphertext container: {err}")))?;

        let iv: [u8; 16] = decode_field(&wire.iv, "iv")?
            .try_into()
            .map_err(|_| KesError::malformed("invalid ciphertext container: iv must be 16 bytes"))?;
        let nonce: [u8; 12] = match wire.nonce {
            Some(encoded) => decode_field(&encoded, "nonce")?
                .try_into()
                .map_err(|_| KesError::malformed("invalid ciphertext container: nonce must be 12 bytes"))?,
            // Legacy containers carry only the iv.
            None => {
                let mut nonce = [0u8; 12];
                nonce.copy_from_slice(&iv[..12]);
                nonce
            }
        };
        let bytes = decode_field(&wire.bytes, "bytes")?;
        Ok(Self { algorithm: wire.alg, iv, nonce, bytes })
    }
}

fn decode_field(encoded: &str, field: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|err| KesError::malformed(format!("invalid ciphertext container: bad base64 in {field}: {err}")))
}

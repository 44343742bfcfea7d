//! Key operations: create, import, generate, encrypt, decrypt, delete,
//! list.

use super::{decode_base64, encode_base64, error_line, ndjson, parse_json, parse_json_required};
use crate::api::error::ApiResult;
use crate::api::middleware::authorize::CallerIdentity;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::Response;
use axum::{Extension, Json};
use sanctum_core::application::Enclave;
use sanctum_core::domain::{Name, Pattern};
use sanctum_core::infrastructure::crypto::{Context, SealedObject};
use sanctum_core::infrastructure::keystore::KeyIter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub async fn create_key(
    Extension(enclave): Extension<Arc<Enclave>>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let name = Name::new(name)?;
    enclave.create_key(&name, &identity).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct ImportRequest {
    bytes: String,
}

pub async fn import_key(
    Extension(enclave): Extension<Arc<Enclave>>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let name = Name::new(name)?;
    let request: ImportRequest = parse_json_required(&body)?;
    let material = decode_base64(&request.bytes, "bytes")?;
    enclave.import_key(&name, &material, &identity).await?;
    Ok(StatusCode::OK)
}

#[derive(Default, Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    context: Context,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    plaintext: String,
    ciphertext: String,
}

pub async fn generate_key(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<GenerateResponse>> {
    let name = Name::new(name)?;
    let request: GenerateRequest = parse_json(&body)?;
    let (plaintext, sealed) = enclave.generate_key(&name, &request.context).await?;
    Ok(Json(GenerateResponse {
        plaintext: encode_base64(&plaintext),
        ciphertext: encode_base64(&sealed.to_vec()?),
    }))
}

#[derive(Deserialize)]
struct EncryptRequest {
    plaintext: String,
    #[serde(default)]
    context: Context,
}

#[derive(Serialize)]
pub struct EncryptResponse {
    ciphertext: String,
}

pub async fn encrypt_key(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<EncryptResponse>> {
    let name = Name::new(name)?;
    let request: EncryptRequest = parse_json_required(&body)?;
    let plaintext = decode_base64(&request.plaintext, "plaintext")?;
    let sealed = enclave.encrypt_key(&name, &plaintext, &request.context).await?;
    Ok(Json(EncryptResponse { ciphertext: encode_base64(&sealed.to_vec()?) }))
}

#[derive(Deserialize)]
struct DecryptRequest {
    ciphertext: String,
    #[serde(default)]
    context: Context,
}

#[derive(Serialize)]
pub struct DecryptResponse {
    plaintext: String,
}

pub async fn decrypt_key(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<DecryptResponse>> {
    let name = Name::new(name)?;
    let request: DecryptRequest = parse_json_required(&body)?;
    let sealed = SealedObject::from_slice(&decode_base64(&request.ciphertext, "ciphertext")?)?;
    let plaintext = enclave.decrypt_key(&name, &sealed, &request.context).await?;
    Ok(Json(DecryptResponse { plaintext: encode_base64(&plaintext) }))
}

pub async fn delete_key(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let name = Name::new(name)?;
    enclave.delete_key(&name).await?;
    Ok(StatusCode::OK)
}

struct ListCursor {
    iter: KeyIter,
    enclave: Arc<Enclave>,
    pattern: Pattern,
    done: bool,
}

pub async fn list_keys(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(pattern): Path<String>,
) -> ApiResult<Response> {
    let pattern = Pattern::new(pattern)?;
    let iter = enclave.list_keys().await?;

    let stream = futures::stream::unfold(
        ListCursor { iter, enclave, pattern, done: false },
        |mut cursor| async move {
            if cursor.done {
                return None;
            }
            loop {
                match cursor.iter.next() {
                    None => return None,
                    Some(Err(err)) => {
                        cursor.done = true;
                        return Some((error_line(err), cursor));
                    }
                    Some(Ok(name)) => {
                        if !cursor.pattern.matches(name.as_str()) {
                            continue;
                        }
                        match cursor.enclave.describe_key(&name).await {
                            Ok((created_at, _)) => {
                                let line = format!(
                                    "{}\n",
                                    serde_json::json!({ "name": name.as_str(), "created_at": created_at })
                                );
                                return Some((line, cursor));
                            }
                            // Names can vanish between listing and lookup.
                            Err(sanctum_core::KesError::KeyNotFound(_)) => continue,
                            Err(err) => {
                                cursor.done = true;
                                return Some((error_line(err), cursor));
                            }
                        }
                    }
                }
            }
        },
    );
    Ok(ndjson(stream))
}

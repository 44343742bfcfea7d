//! Policy CRUD.

use super::{ndjson, parse_json_required};
use crate::api::error::ApiResult;
use crate::api::middleware::authorize::CallerIdentity;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::Response;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use sanctum_core::application::Enclave;
use sanctum_core::domain::{Identity, Name, Pattern, Policy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
pub struct DescribeResponse {
    created_at: DateTime<Utc>,
    created_by: Identity,
}

pub async fn describe_policy(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(name): Path<String>,
) -> ApiResult<Json<DescribeResponse>> {
    let name = Name::new(name)?;
    let policy = enclave.get_policy(&name)?;
    Ok(Json(DescribeResponse { created_at: policy.created_at, created_by: policy.created_by }))
}

#[derive(Serialize)]
pub struct ReadResponse {
    allow: Vec<String>,
    deny: Vec<String>,
    created_at: DateTime<Utc>,
    created_by: Identity,
}

pub async fn read_policy(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ReadResponse>> {
    let name = Name::new(name)?;
    let policy = enclave.get_policy(&name)?;
    Ok(Json(ReadResponse {
        allow: policy.allow,
        deny: policy.deny,
        created_at: policy.created_at,
        created_by: policy.created_by,
    }))
}

#[derive(Deserialize)]
struct WriteRequest {
    #[serde(default)]
    allow: Vec<String>,
    #[serde(default)]
    deny: Vec<String>,
}

pub async fn write_policy(
    Extension(enclave): Extension<Arc<Enclave>>,
    Extension(CallerIdentity(identity)): Extension<CallerIdentity>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let name = Name::new(name)?;
    let request: WriteRequest = parse_json_required(&body)?;
    enclave.set_policy(&name, Policy::new(request.allow, request.deny, identity)).await?;
    Ok(StatusCode::OK)
}

pub async fn delete_policy(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let name = Name::new(name)?;
    enclave.delete_policy(&name).await?;
    Ok(StatusCode::OK)
}

pub async fn list_policies(
    Extension(enclave): Extension<Arc<Enclave>>,
    Path(pattern): Path<String>,
) -> ApiResult<Response> {
    let pattern = Pattern::new(pattern)?;
    let mut policies = enclave.list_policies();
    policies.retain(|(name, _)| pattern.matches(name.as_str()));
    policies.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));

    let lines: Vec<String> = policies
        .into_iter()
        .map(|(name, info)| {
            format!(
                "{}\n",
                serde_json::json!({
                    "name": name.as_str(),
                    "created_at": info.created_at,
                    "created_by": info.created_by,
                })
            )
        })
        .collect();
    Ok(ndjson(futures::stream::iter(lines)))
}

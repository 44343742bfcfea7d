use crate::api::error::ApiError;
use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sanctum_core::KesError;

/// Rejects paths with `.`/`..` segments or duplicate slashes before the
/// router sees them.
pub async fn normalize_middleware(req: Request<Body>, next: Next) -> Response {
    if let Err(err) = check_path(req.uri().path()) {
        return ApiError::from(err).into_response();
    }
    next.run(req).await
}

pub fn check_path(path: &str) -> Result<(), KesError> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(KesError::InvalidPath(path.to_string()));
    };
    let segments: Vec<&str> = rest.split('/').collect();
    let last = segments.len() - 1;
    for (index, segment) in segments.iter().enumerate() {
        if *segment == "." || *segment == ".." {
            return Err(KesError::InvalidPath(path.to_string()));
        }
        // One empty segment at the end is a trailing slash; anywhere else
        // it is a duplicate slash.
        if segment.is_empty() && index != last {
            return Err(KesError::InvalidPath(path.to_string()));
        }
    }
    Ok(())
}

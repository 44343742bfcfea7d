use crate::api::state::SharedState;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

pub async fn metrics_middleware(State(state): State<SharedState>, req: Request<Body>, next: Next) -> Response {
    let route = route_label(req.uri().path());
    let start = Instant::now();
    state.metrics.inc_in_flight();
    let response = next.run(req).await;
    state.metrics.dec_in_flight();
    state.metrics.observe_request(&route, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

/// Route label with the trailing name stripped, keeping metric cardinality
/// bounded: `/v1/key/create/my-key` labels as `/v1/key/create`.
fn route_label(path: &str) -> String {
    let mut label = String::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()).take(3) {
        label.push('/');
        label.push_str(segment);
    }
    if label.is_empty() {
        label.push('/');
    }
    label
}

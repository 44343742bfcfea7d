//! Route table and middleware composition.
//!
//! Fixed outer-to-inner order: audit, timeout (audit trace exempt),
//! metrics, proxy unwrap and URL normalization run on every request;
//! after routing, each method router carries enclave lookup +
//! authorization and its body limit. Authorization sits on the method
//! routers (not the routes) so a method mismatch answers 405 before the
//! authorization gate answers 403; the public routes carry no gate at
//! all.

use crate::api::handlers::{identities, keys, policies, system};
use crate::api::middleware::timeout::AUDIT_TRACE_PATH;
use crate::api::middleware::{audit, authorize, metrics, normalize, proxy, timeout};
use crate::api::state::SharedState;
use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use axum::Router;

const MAX_BODY: usize = 1 << 20;
const MAX_ASSIGN_BODY: usize = 1024;

pub fn build_router(state: SharedState) -> Router {
    let auth = from_fn_with_state(state.clone(), authorize::authorize_middleware);

    let protected = Router::new()
        .route(
            "/v1/key/create/{name}",
            post(keys::create_key).layer(DefaultBodyLimit::max(0)).route_layer(auth.clone()),
        )
        .route(
            "/v1/key/import/{name}",
            post(keys::import_key).layer(DefaultBodyLimit::max(MAX_BODY)).route_layer(auth.clone()),
        )
        .route(
            "/v1/key/generate/{name}",
            post(keys::generate_key).layer(DefaultBodyLimit::max(MAX_BODY)).route_layer(auth.clone()),
        )
        .route(
            "/v1/key/encrypt/{name}",
            post(keys::encrypt_key).layer(DefaultBodyLimit::max(MAX_BODY)).route_layer(auth.clone()),
        )
        .route(
            "/v1/key/decrypt/{name}",
            post(keys::decrypt_key).layer(DefaultBodyLimit::max(MAX_BODY)).route_layer(auth.clone()),
        )
        .route(
            "/v1/key/delete/{name}",
            delete(keys::delete_key).layer(DefaultBodyLimit::max(0)).route_layer(auth.clone()),
        )
        .route(
            "/v1/key/list/{pattern}",
            get(keys::list_keys).layer(DefaultBodyLimit::max(0)).route_layer(auth.clone()),
        )
        .route(
            "/v1/policy/describe/{name}",
            get(policies::describe_policy).layer(DefaultBodyLimit::max(0)).route_layer(auth.clone()),
        )
        .route(
            "/v1/policy/read/{name}",
            get(policies::read_policy).layer(DefaultBodyLimit::max(0)).route_layer(auth.clone()),
        )
        .route(
            "/v1/policy/write/{name}",
            post(policies::write_policy).layer(DefaultBodyLimit::max(MAX_BODY)).route_layer(auth.clone()),
        )
        .route(
            "/v1/policy/delete/{name}",
            delete(policies::delete_policy).layer(DefaultBodyLimit::max(0)).route_layer(auth.clone()),
        )
        .route(
            "/v1/policy/list/{pattern}",
            get(policies::list_policies).layer(DefaultBodyLimit::max(0)).route_layer(auth.clone()),
        )
        .route(
            "/v1/identity/assign/{policy}",
            post(identities::assign_identity).layer(DefaultBodyLimit::max(MAX_ASSIGN_BODY)).route_layer(auth.clone()),
        )
        .route(
            "/v1/identity/forget/{identity}",
            delete(identities::forget_identity).layer(DefaultBodyLimit::max(0)).route_layer(auth.clone()),
        )
        .route(
            "/v1/identity/list/{pattern}",
            get(identities::list_identities).layer(DefaultBodyLimit::max(0)).route_layer(auth.clone()),
        )
        .route("/v1/status", get(system::status).layer(DefaultBodyLimit::max(0)).route_layer(auth.clone()))
        .route(AUDIT_TRACE_PATH, get(system::audit_trace).route_layer(auth));

    let mut public = Router::new()
        .route("/version", get(system::version))
        .route("/metrics", get(system::metrics_text));
    if state.ready_enabled {
        public = public.route("/v1/ready", get(system::ready));
    }

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(from_fn(normalize::normalize_middleware))
        .layer(from_fn_with_state(state.clone(), proxy::proxy_middleware))
        .layer(from_fn_with_state(state.clone(), metrics::metrics_middleware))
        .layer(from_fn(timeout::timeout_middleware))
        .layer(from_fn_with_state(state.clone(), audit::audit_middleware))
        .with_state(state)
}

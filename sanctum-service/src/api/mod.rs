pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
pub mod tls;

pub use router::build_router;
pub use state::{AppState, Peer, SharedState, ENCLAVE_HEADER};

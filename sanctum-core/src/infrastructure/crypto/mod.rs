//! Authenticated encryption over named 32-byte keys.

mod context;
mod sealed;
mod secret_key;

pub use context::Context;
pub use sealed::SealedObject;
pub use secret_key::{Algorithm, SecretKey, MAX_WRAP_LEN};

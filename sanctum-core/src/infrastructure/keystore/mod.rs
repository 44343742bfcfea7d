//! The uniform contract every key-store backend exports.

mod fs;
mod mem;

pub use fs::{FsPolicyMirror, FsStore};
pub use mem::MemStore;

use crate::domain::{Name, Policy};
use crate::foundation::Result;
use crate::infrastructure::crypto::SecretKey;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Whether the backend answered its last probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreHealth {
    Available,
    Unreachable,
}

/// Result of a [`KeyStore::status`] probe.
#[derive(Clone, Copy, Debug)]
pub struct StoreState {
    pub health: StoreHealth,
    pub latency: Duration,
}

/// Single-pass listing of key names. Entry-level failures surface as `Err`
/// items; dropping the iterator releases any backend resources.
pub type KeyIter = Box<dyn Iterator<Item = Result<Name>> + Send>;

/// Contract between the enclave/cache and a concrete backend.
///
/// All methods are safe under concurrent invocation, and `create` is
/// linearizable with respect to `get` and `delete` on the same name.
/// Callers validate names before handing them down.
pub trait KeyStore: Send + Sync {
    /// Short backend tag used in errors and logs (e.g. `"mem"`, `"fs"`).
    fn backend(&self) -> &'static str;

    /// Probes the backend. Must complete within a bounded interval; an
    /// unreachable backend reports so instead of hanging.
    fn status<'a>(&'a self) -> Pin<Box<dyn Future<Output = StoreState> + Send + 'a>>;

    /// Atomic create-if-absent. Fails with `KeyExists` when the name is
    /// taken.
    fn create<'a>(&'a self, name: &'a Name, key: SecretKey) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Fetches the stored key or fails with `KeyNotFound`.
    fn get<'a>(&'a self, name: &'a Name) -> Pin<Box<dyn Future<Output = Result<SecretKey>> + Send + 'a>>;

    /// Idempotent removal; deleting an absent name succeeds.
    fn delete<'a>(&'a self, name: &'a Name) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Lists key names in unspecified but per-iteration-stable order.
    fn list<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<KeyIter>> + Send + 'a>>;
}

/// Optional durable mirror for policies, kept in a namespace disjoint from
/// keys. Backends without durable storage simply do not provide one.
pub trait PolicyMirror: Send + Sync {
    fn save<'a>(&'a self, name: &'a Name, policy: &'a Policy) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn delete<'a>(&'a self, name: &'a Name) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn load_all<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<(Name, Policy)>>> + Send + 'a>>;
}

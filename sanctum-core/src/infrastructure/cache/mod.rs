//! Plaintext key cache between the enclave and its key store.
//!
//! Entries carry two clocks: a hard TTL (`any`) after which the entry is
//! stale, and an idle TTL (`unused`) that evicts entries nobody reads.
//! When `offline` is enabled, stale entries remain servable for that long
//! while the backend is unreachable. Concurrent misses on one name
//! coalesce into a single backend fetch.

use crate::domain::Name;
use crate::foundation::{KesError, Result};
use crate::infrastructure::crypto::SecretKey;
use crate::infrastructure::keystore::{KeyStore, StoreHealth};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const SHARD_COUNT: usize = 16;
const STATUS_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Expiry configuration. Defaults follow the server defaults: five minute
/// hard TTL, thirty second idle TTL, offline tier disabled.
#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    /// Hard TTL: entries turn stale this long after insertion.
    pub any: Duration,
    /// Idle TTL: entries nobody read within this interval are evicted.
    pub unused: Duration,
    /// Stale entries stay servable for this long while the backend is
    /// unreachable. Zero disables the offline tier.
    pub offline: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { any: Duration::from_secs(5 * 60), unused: Duration::from_secs(30), offline: Duration::ZERO }
    }
}

impl CacheConfig {
    pub fn sweep_period(&self) -> Duration {
        (self.any.min(self.unused) / 2).max(Duration::from_millis(10))
    }
}

struct Entry {
    key: SecretKey,
    inserted_at: Instant,
    last_used: Instant,
}

/// Cloneable snapshot of a fetch failure, so every waiter of a flight
/// receives the same error.
#[derive(Clone, Debug)]
struct FetchError {
    code: ErrKind,
    message: String,
}

#[derive(Clone, Copy, Debug)]
enum ErrKind {
    NotFound,
    Unreachable,
    Other,
}

impl FetchError {
    fn of(err: &KesError) -> Self {
        let code = match err {
            KesError::KeyNotFound(_) => ErrKind::NotFound,
            err if err.is_unreachable() => ErrKind::Unreachable,
            _ => ErrKind::Other,
        };
        Self { code, message: err.to_string() }
    }

    fn to_error(&self, name: &Name, backend: &'static str) -> KesError {
        match self.code {
            ErrKind::NotFound => KesError::key_not_found(name.as_str()),
            ErrKind::Unreachable => KesError::store_unavailable(backend, self.message.clone()),
            ErrKind::Other => KesError::store_error("get", self.message.clone()),
        }
    }

    fn is_unreachable(&self) -> bool {
        matches!(self.code, ErrKind::Unreachable)
    }
}

/// Admission token for one in-flight fetch. The leader resolves it exactly
/// once; waiters block on the watch channel.
struct Flight {
    done: watch::Sender<bool>,
    result: OnceLock<std::result::Result<SecretKey, FetchError>>,
    /// Set by a delete that raced the fetch: the result must not be
    /// inserted into the cache.
    no_insert: AtomicBool,
}

impl Flight {
    fn new() -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self { done, result: OnceLock::new(), no_insert: AtomicBool::new(false) })
    }

    async fn wait(&self) -> std::result::Result<SecretKey, FetchError> {
        let mut rx = self.done.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        match self.result.get() {
            Some(Ok(key)) => Ok(key.clone()),
            Some(Err(err)) => Err(err.clone()),
            None => Err(FetchError { code: ErrKind::Unreachable, message: "key fetch abandoned".to_string() }),
        }
    }

    fn resolve(&self, result: std::result::Result<SecretKey, FetchError>) {
        let _ = self.result.set(result);
        let _ = self.done.send(true);
    }
}

struct Shard {
    entries: HashMap<Name, Entry>,
    flights: HashMap<Name, Arc<Flight>>,
}

impl Shard {
    fn new() -> Self {
        Self { entries: HashMap::new(), flights: HashMap::new() }
    }
}

struct CacheInner {
    config: CacheConfig,
    shards: Vec<Mutex<Shard>>,
    store: Arc<dyn KeyStore>,
    backend_unreachable: AtomicBool,
}

impl CacheInner {
    fn shard(&self, name: &Name) -> MutexGuard<'_, Shard> {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        self.shards[index].lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Resolves one leader per missing name; everyone else waits on the
/// leader's flight. Dropping the guard before resolution (request
/// cancelled mid-fetch) fails all waiters with the same error and inserts
/// nothing.
struct FlightGuard {
    inner: Arc<CacheInner>,
    name: Name,
    flight: Arc<Flight>,
    resolved: bool,
}

impl FlightGuard {
    fn complete(mut self, result: &Result<SecretKey>) {
        let mut shard = self.inner.shard(&self.name);
        match result {
            Ok(key) => {
                self.flight.resolve(Ok(key.clone()));
                if !self.flight.no_insert.load(Ordering::Acquire) {
                    let now = Instant::now();
                    shard.entries.insert(self.name.clone(), Entry { key: key.clone(), inserted_at: now, last_used: now });
                }
            }
            Err(err) => {
                self.flight.resolve(Err(FetchError::of(err)));
            }
        }
        shard.flights.remove(&self.name);
        self.resolved = true;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        self.flight.resolve(Err(FetchError {
            code: ErrKind::Unreachable,
            message: "key fetch cancelled".to_string(),
        }));
        self.inner.shard(&self.name).flights.remove(&self.name);
    }
}

enum Lookup {
    Hit(SecretKey),
    Wait(Arc<Flight>, Option<SecretKey>),
    Lead(FlightGuard, Option<SecretKey>),
    Offline(SecretKey),
}

pub struct KeyCache {
    inner: Arc<CacheInner>,
}

impl KeyCache {
    pub fn new(store: Arc<dyn KeyStore>, config: CacheConfig) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(Shard::new())).collect();
        Self { inner: Arc::new(CacheInner { config, shards, store, backend_unreachable: AtomicBool::new(false) }) }
    }

    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.inner.store
    }

    /// Fetches the key for `name`, from cache when fresh, otherwise from
    /// the backend with per-name single-flight admission.
    pub async fn get(&self, name: &Name) -> Result<SecretKey> {
        let lookup = self.admit(name);
        match lookup {
            Lookup::Hit(key) | Lookup::Offline(key) => Ok(key),
            Lookup::Wait(flight, offline) => match flight.wait().await {
                Ok(key) => Ok(key),
                Err(err) if err.is_unreachable() => match offline {
                    Some(key) => Ok(key),
                    None => Err(err.to_error(name, self.inner.store.backend())),
                },
                Err(err) => Err(err.to_error(name, self.inner.store.backend())),
            },
            Lookup::Lead(guard, offline) => {
                let result = self.inner.store.get(name).await;
                guard.complete(&result);
                match result {
                    Ok(key) => {
                        self.inner.backend_unreachable.store(false, Ordering::Release);
                        Ok(key)
                    }
                    Err(err) if err.is_unreachable() => {
                        self.inner.backend_unreachable.store(true, Ordering::Release);
                        match offline {
                            Some(key) => {
                                log::debug!("serving offline cache entry name={name} reason={err}");
                                Ok(key)
                            }
                            None => Err(err),
                        }
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Deletes through to the backend; the cache entry is evicted only
    /// after the backend acknowledged the delete.
    pub async fn delete(&self, name: &Name) -> Result<()> {
        self.inner.store.delete(name).await?;
        let mut shard = self.inner.shard(name);
        shard.entries.remove(name);
        if let Some(flight) = shard.flights.get(name) {
            flight.no_insert.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn admit(&self, name: &Name) -> Lookup {
        let offline_enabled = !self.inner.config.offline.is_zero();
        let mut shard = self.inner.shard(name);
        let now = Instant::now();

        let mut offline_candidate = None;
        let mut evict_stale = false;
        if let Some(entry) = shard.entries.get_mut(name) {
            let age = now.saturating_duration_since(entry.inserted_at);
            if age < self.inner.config.any {
                entry.last_used = now;
                return Lookup::Hit(entry.key.clone());
            }
            let within_offline_window = offline_enabled && age < self.inner.config.any + self.inner.config.offline;
            if within_offline_window {
                offline_candidate = Some(entry.key.clone());
            } else {
                evict_stale = true;
            }
        }
        if evict_stale {
            shard.entries.remove(name);
        }

        // A stale entry is directly servable while the backend is known
        // unreachable; otherwise the fetch below decides.
        if let Some(key) = &offline_candidate {
            if self.inner.backend_unreachable.load(Ordering::Acquire) {
                return Lookup::Offline(key.clone());
            }
        }

        if let Some(flight) = shard.flights.get(name) {
            return Lookup::Wait(flight.clone(), offline_candidate);
        }
        let flight = Flight::new();
        shard.flights.insert(name.clone(), flight.clone());
        let guard = FlightGuard { inner: self.inner.clone(), name: name.clone(), flight, resolved: false };
        Lookup::Lead(guard, offline_candidate)
    }

    /// Spawns the background sweeper. The returned handle stops it.
    pub fn spawn_sweeper(&self) -> CacheSweeper {
        let inner = self.inner.clone();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = inner.config.sweep_period();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => sweep(&inner).await,
                    _ = shutdown_rx.changed() => break,
                }
            }
            log::debug!("cache sweeper stopped");
        });
        CacheSweeper { shutdown: shutdown_tx, handle }
    }

    #[cfg(test)]
    fn contains(&self, name: &Name) -> bool {
        self.inner.shard(name).entries.contains_key(name)
    }
}

/// One sweep: probe the backend once (bounded, no locks held), then apply
/// the eviction state machine shard by shard.
async fn sweep(inner: &Arc<CacheInner>) {
    let unreachable = match tokio::time::timeout(STATUS_PROBE_TIMEOUT, inner.store.status()).await {
        Ok(state) => state.health == StoreHealth::Unreachable,
        Err(_) => true,
    };
    inner.backend_unreachable.store(unreachable, Ordering::Release);

    let config = inner.config;
    let offline_enabled = !config.offline.is_zero();
    let now = Instant::now();
    let mut evicted = 0usize;
    for shard in &inner.shards {
        let mut shard = shard.lock().unwrap_or_else(|err| err.into_inner());
        let before = shard.entries.len();
        shard.entries.retain(|_, entry| {
            let age = now.saturating_duration_since(entry.inserted_at);
            let idle = now.saturating_duration_since(entry.last_used);
            if age < config.any {
                idle < config.unused
            } else {
                offline_enabled && unreachable && age < config.any + config.offline
            }
        });
        evicted += before - shard.entries.len();
    }
    if evicted > 0 {
        log::debug!("cache sweep evicted={evicted} backend_unreachable={unreachable}");
    }
}

pub struct CacheSweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

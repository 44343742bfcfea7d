//! The enclave: one policy table, one identity index, one key store
//! binding, one cache.

use crate::domain::{Identity, IdentityIndex, Name, Policy, PolicyInfo};
use crate::foundation::{KesError, Result};
use crate::infrastructure::cache::{CacheConfig, CacheSweeper, KeyCache};
use crate::infrastructure::crypto::{Algorithm, Context, SealedObject, SecretKey};
use crate::infrastructure::keystore::{KeyIter, KeyStore, PolicyMirror, StoreState};
use log::{debug, info};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

pub const DEFAULT_ENCLAVE: &str = "default";

pub struct Enclave {
    name: String,
    admin: Option<Identity>,
    policies: RwLock<HashMap<Name, Policy>>,
    identities: IdentityIndex,
    cache: KeyCache,
    mirror: Option<Arc<dyn PolicyMirror>>,
    sweeper: Mutex<Option<CacheSweeper>>,
}

impl Enclave {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn KeyStore>,
        cache_config: CacheConfig,
        admin: Option<Identity>,
        mirror: Option<Arc<dyn PolicyMirror>>,
    ) -> Self {
        Self {
            name: name.into(),
            admin,
            policies: RwLock::new(HashMap::new()),
            identities: IdentityIndex::new(),
            cache: KeyCache::new(store, cache_config),
            mirror,
            sweeper: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn admin(&self) -> Option<&Identity> {
        self.admin.as_ref()
    }

    /// Loads mirrored policies, pre-creates declared keys and starts the
    /// cache sweeper. Called once before the enclave serves requests.
    pub async fn start(&self, warm_keys: &[Name]) -> Result<()> {
        if let Some(mirror) = &self.mirror {
            let restored = mirror.load_all().await?;
            let count = restored.len();
            let mut policies = self.policies.write().unwrap_or_else(|err| err.into_inner());
            for (name, policy) in restored {
                policies.insert(name, policy);
            }
            drop(policies);
            if count > 0 {
                info!("restored mirrored policies enclave={} count={}", self.name, count);
            }
        }

        for name in warm_keys {
            let key = SecretKey::generate(Algorithm::preferred(), self.system_identity());
            match self.cache.store().create(name, key).await {
                Ok(()) => info!("created declared key enclave={} key={}", self.name, name),
                Err(KesError::KeyExists(_)) => debug!("declared key exists enclave={} key={}", self.name, name),
                Err(err) => return Err(err),
            }
        }

        let mut sweeper = self.sweeper.lock().unwrap_or_else(|err| err.into_inner());
        if sweeper.is_none() {
            *sweeper = Some(self.cache.spawn_sweeper());
        }
        Ok(())
    }

    /// Stops the sweeper. The store binding is dropped with the enclave.
    pub async fn stop(&self) {
        let sweeper = self.sweeper.lock().unwrap_or_else(|err| err.into_inner()).take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }
    }

    /// The authorization gate: resolves the caller's policy and evaluates
    /// the request path against it. The admin identity bypasses policy
    /// evaluation; the unknown identity is always denied.
    pub fn verify_request(&self, identity: &Identity, path: &str) -> Result<()> {
        if identity.is_unknown() {
            return Err(KesError::NotAuthorized);
        }
        if let Some(admin) = &self.admin {
            if admin.ct_eq(identity) {
                return Ok(());
            }
        }
        let Some(policy_name) = self.identities.get(identity) else {
            return Err(KesError::NotAuthorized);
        };
        let policies = self.policies.read().unwrap_or_else(|err| err.into_inner());
        match policies.get(&policy_name) {
            Some(policy) => policy.verify(path),
            // A dangling binding to a deleted policy grants nothing.
            None => Err(KesError::NotAuthorized),
        }
    }

    pub async fn create_key(&self, name: &Name, created_by: &Identity) -> Result<()> {
        let key = SecretKey::generate(Algorithm::preferred(), created_by.clone());
        self.cache.store().create(name, key).await
    }

    pub async fn import_key(&self, name: &Name, material: &[u8], created_by: &Identity) -> Result<()> {
        let key = SecretKey::from_bytes(material, Algorithm::preferred(), created_by.clone())?;
        self.cache.store().create(name, key).await
    }

    /// Returns 32 fresh random bytes alongside their sealed form.
    pub async fn generate_key(&self, name: &Name, context: &Context) -> Result<(Vec<u8>, SealedObject)> {
        let key = self.cache.get(name).await?;
        let mut plaintext = vec![0u8; 32];
        OsRng.fill_bytes(&mut plaintext);
        let sealed = key.seal(&plaintext, context)?;
        Ok((plaintext, sealed))
    }

    pub async fn encrypt_key(&self, name: &Name, plaintext: &[u8], context: &Context) -> Result<SealedObject> {
        let key = self.cache.get(name).await?;
        key.seal(plaintext, context)
    }

    pub async fn decrypt_key(&self, name: &Name, sealed: &SealedObject, context: &Context) -> Result<Vec<u8>> {
        let key = self.cache.get(name).await?;
        key.unseal(sealed, context)
    }

    pub async fn delete_key(&self, name: &Name) -> Result<()> {
        self.cache.delete(name).await
    }

    pub async fn list_keys(&self) -> Result<KeyIter> {
        self.cache.store().list().await
    }

    /// Key metadata for listings, straight from the backend.
    pub async fn describe_key(&self, name: &Name) -> Result<(chrono::DateTime<chrono::Utc>, Algorithm)> {
        let key = self.cache.store().get(name).await?;
        Ok((key.created_at, key.algorithm))
    }

    pub async fn status(&self) -> StoreState {
        self.cache.store().status().await
    }

    pub fn backend(&self) -> &'static str {
        self.cache.store().backend()
    }

    pub fn get_policy(&self, name: &Name) -> Result<Policy> {
        self.policies
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| KesError::policy_not_found(name.as_str()))
    }

    /// Replaces the policy under `name`. The mirror write happens first;
    /// the in-memory table only changes once the mirror accepted it.
    pub async fn set_policy(&self, name: &Name, policy: Policy) -> Result<()> {
        if let Some(mirror) = &self.mirror {
            mirror.save(name, &policy).await?;
        }
        self.policies.write().unwrap_or_else(|err| err.into_inner()).insert(name.clone(), policy);
        Ok(())
    }

    pub async fn delete_policy(&self, name: &Name) -> Result<()> {
        if let Some(mirror) = &self.mirror {
            mirror.delete(name).await?;
        }
        match self.policies.write().unwrap_or_else(|err| err.into_inner()).remove(name) {
            Some(_) => Ok(()),
            None => Err(KesError::policy_not_found(name.as_str())),
        }
    }

    pub fn list_policies(&self) -> Vec<(Name, PolicyInfo)> {
        self.policies
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .iter()
            .map(|(name, policy)| (name.clone(), policy.info()))
            .collect()
    }

    /// Binds `identity` to `policy`. The policy must exist; the API layer
    /// rejects self-assignment before calling this.
    pub fn assign_policy(&self, policy: &Name, identity: &Identity) -> Result<()> {
        if !self.policies.read().unwrap_or_else(|err| err.into_inner()).contains_key(policy) {
            return Err(KesError::policy_not_found(policy.as_str()));
        }
        self.identities.assign(policy, identity)
    }

    pub fn forget_identity(&self, identity: &Identity) {
        self.identities.forget(identity)
    }

    pub fn list_identities(&self) -> Vec<(Identity, Option<Name>)> {
        self.identities
            .list()
            .into_iter()
            .map(|identity| {
                let policy = self.identities.get(&identity);
                (identity, policy)
            })
            .collect()
    }

    fn system_identity(&self) -> Identity {
        self.admin.clone().unwrap_or_else(Identity::unknown)
    }
}

/// All enclaves the server hosts. The default enclave always exists;
/// additional named enclaves are optional.
pub struct EnclaveRegistry {
    enclaves: HashMap<String, Arc<Enclave>>,
}

impl EnclaveRegistry {
    pub fn new(default_enclave: Arc<Enclave>) -> Self {
        let mut enclaves = HashMap::new();
        enclaves.insert(DEFAULT_ENCLAVE.to_string(), default_enclave);
        Self { enclaves }
    }

    pub fn insert(&mut self, name: impl Into<String>, enclave: Arc<Enclave>) {
        self.enclaves.insert(name.into(), enclave);
    }

    /// Resolves the enclave a request targets; no selector means the
    /// default enclave.
    pub fn resolve(&self, selector: Option<&str>) -> Result<Arc<Enclave>> {
        let name = match selector {
            None => DEFAULT_ENCLAVE,
            Some(name) if name.trim().is_empty() => DEFAULT_ENCLAVE,
            Some(name) => name,
        };
        self.enclaves.get(name).cloned().ok_or_else(|| KesError::EnclaveNotFound(name.to_string()))
    }

    pub fn default_enclave(&self) -> Arc<Enclave> {
        self.enclaves[DEFAULT_ENCLAVE].clone()
    }

    pub async fn stop_all(&self) {
        for enclave in self.enclaves.values() {
            enclave.stop().await;
        }
        info!("all enclaves stopped");
    }
}

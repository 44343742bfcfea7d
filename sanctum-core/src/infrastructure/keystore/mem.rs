//! In-memory key store. Keys live for the lifetime of the process.

use crate::domain::Name;
use crate::foundation::{KesError, Result};
use crate::infrastructure::crypto::SecretKey;
use crate::infrastructure::keystore::{KeyIter, KeyStore, StoreHealth, StoreState};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;
use std::time::Duration;

pub struct MemStore {
    store: RwLock<HashMap<Name, SecretKey>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self { store: RwLock::new(HashMap::new()) }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemStore {
    fn backend(&self) -> &'static str {
        "mem"
    }

    fn status<'a>(&'a self) -> Pin<Box<dyn Future<Output = StoreState> + Send + 'a>> {
        Box::pin(async { StoreState { health: StoreHealth::Available, latency: Duration::ZERO } })
    }

    fn create<'a>(&'a self, name: &'a Name, key: SecretKey) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut store = self.store.write().unwrap_or_else(|err| err.into_inner());
            if store.contains_key(name) {
                return Err(KesError::key_exists(name.as_str()));
            }
            store.insert(name.clone(), key);
            Ok(())
        })
    }

    fn get<'a>(&'a self, name: &'a Name) -> Pin<Box<dyn Future<Output = Result<SecretKey>> + Send + 'a>> {
        Box::pin(async move {
            self.store
                .read()
                .unwrap_or_else(|err| err.into_inner())
                .get(name)
                .cloned()
                .ok_or_else(|| KesError::key_not_found(name.as_str()))
        })
    }

    fn delete<'a>(&'a self, name: &'a Name) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.store.write().unwrap_or_else(|err| err.into_inner()).remove(name);
            Ok(())
        })
    }

    fn list<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<KeyIter>> + Send + 'a>> {
        Box::pin(async move {
            let names: Vec<Name> = self.store.read().unwrap_or_else(|err| err.into_inner()).keys().cloned().collect();
            Ok(Box::new(names.into_iter().map(Ok)) as KeyIter)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Identity;
    use crate::infrastructure::crypto::Algorithm;

    fn key() -> SecretKey {
        SecretKey::generate(Algorithm::Aes256Gcm, Identity::new("tester"))
    }

    fn name(s: &str) -> Name {
        Name::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let store = MemStore::new();
        let k = key();
        store.create(&name("k1"), k.clone()).await.unwrap();
        let got = store.get(&name("k1")).await.unwrap();
        assert_eq!(got.mac(b"probe"), k.mac(b"probe"));
    }

    #[tokio::test]
    async fn test_create_if_absent() {
        let store = MemStore::new();
        store.create(&name("k1"), key()).await.unwrap();
        assert!(matches!(store.create(&name("k1"), key()).await, Err(KesError::KeyExists(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemStore::new();
        store.create(&name("k1"), key()).await.unwrap();
        store.delete(&name("k1")).await.unwrap();
        store.delete(&name("k1")).await.unwrap();
        assert!(matches!(store.get(&name("k1")).await, Err(KesError::KeyNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_names() {
        let store = MemStore::new();
        store.create(&name("a"), key()).await.unwrap();
        store.create(&name("b"), key()).await.unwrap();
        let mut names: Vec<String> =
            store.list().await.unwrap().map(|entry| entry.unwrap().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_status_is_always_available() {
        let store = MemStore::new();
        assert_eq!(store.status().await.health, StoreHealth::Available);
    }
}

//! Filesystem key store.
//!
//! Layout under the configured root:
//!   `<root>/key/<name>`         one JSON document per key, mode 0600
//!   `<root>/policy/<name>`      mirrored policies (see [`PolicyMirror`])
//!
//! Create-if-absent is a write to a unique temp file followed by a hard
//! link to the final name, so concurrent readers never observe a partial
//! key document and two concurrent creates cannot both win.

use crate::domain::{Name, Policy};
use crate::foundation::{KesError, Result};
use crate::infrastructure::crypto::SecretKey;
use crate::infrastructure::keystore::{KeyIter, KeyStore, PolicyMirror, StoreHealth, StoreState};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const KEY_DIR: &str = "key";
const POLICY_DIR: &str = "policy";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Opens (or initializes) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [root.join(KEY_DIR), root.join(POLICY_DIR)] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|err| KesError::store_unavailable("fs", format!("cannot create {}: {err}", dir.display())))?;
        }
        #[cfg(target_family = "unix")]
        restrict_permissions(&root.join(KEY_DIR))?;
        log::info!("filesystem key store ready root={}", root.display());
        Ok(Self { root })
    }

    pub fn mirror(&self) -> FsPolicyMirror {
        FsPolicyMirror { dir: self.root.join(POLICY_DIR) }
    }

    fn key_path(&self, name: &Name) -> PathBuf {
        self.root.join(KEY_DIR).join(name.as_str())
    }

    fn temp_path(&self) -> PathBuf {
        let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root.join(KEY_DIR).join(format!(".tmp-{}-{unique}", std::process::id()))
    }
}

#[cfg(target_family = "unix")]
fn restrict_permissions(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(dir)
        .map_err(|err| KesError::store_unavailable("fs", format!("cannot stat {}: {err}", dir.display())))?
        .permissions();
    perms.set_mode(0o700);
    std::fs::set_permissions(dir, perms)
        .map_err(|err| KesError::store_unavailable("fs", format!("cannot chmod {}: {err}", dir.display())))?;
    Ok(())
}

impl KeyStore for FsStore {
    fn backend(&self) -> &'static str {
        "fs"
    }

    fn status<'a>(&'a self) -> Pin<Box<dyn Future<Output = StoreState> + Send + 'a>> {
        Box::pin(async move {
            let start = Instant::now();
            let health = match tokio::fs::metadata(self.root.join(KEY_DIR)).await {
                Ok(meta) if meta.is_dir() => StoreHealth::Available,
                _ => StoreHealth::Unreachable,
            };
            StoreState { health, latency: start.elapsed() }
        })
    }

    fn create<'a>(&'a self, name: &'a Name, key: SecretKey) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let document = serde_json::to_vec(&key)?;
            let temp = self.temp_path();
            tokio::fs::write(&temp, &document)
                .await
                .map_err(|err| KesError::store_error("create", format!("write {}: {err}", temp.display())))?;
            #[cfg(target_family = "unix")]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600)).await;
            }

            let result = tokio::fs::hard_link(&temp, self.key_path(name)).await;
            let _ = tokio::fs::remove_file(&temp).await;
            match result {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(KesError::key_exists(name.as_str())),
                Err(err) => Err(KesError::store_error("create", format!("link {}: {err}", name))),
            }
        })
    }

    fn get<'a>(&'a self, name: &'a Name) -> Pin<Box<dyn Future<Output = Result<SecretKey>> + Send + 'a>> {
        Box::pin(async move {
            let data = match tokio::fs::read(self.key_path(name)).await {
                Ok(data) => data,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(KesError::key_not_found(name.as_str())),
                Err(err) => return Err(KesError::store_unavailable("fs", format!("read {name}: {err}"))),
            };
            serde_json::from_slice(&data)
                .map_err(|err| KesError::store_error("get", format!("corrupt key document {name}: {err}")))
        })
    }

    fn delete<'a>(&'a self, name: &'a Name) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.key_path(name)).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(KesError::store_error("delete", format!("remove {name}: {err}"))),
            }
        })
    }

    fn list<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<KeyIter>> + Send + 'a>> {
        Box::pin(async move {
            let mut reader = tokio::fs::read_dir(self.root.join(KEY_DIR))
                .await
                .map_err(|err| KesError::store_unavailable("fs", format!("list: {err}")))?;
            let mut entries: Vec<Result<Name>> = Vec::new();
            loop {
                match reader.next_entry().await {
                    Ok(Some(entry)) => {
                        let file_name = entry.file_name();
                        let Some(raw) = file_name.to_str() else { continue };
                        if raw.starts_with(".tmp-") {
                            continue;
                        }
                        match Name::new(raw) {
                            Ok(name) => entries.push(Ok(name)),
                            // Foreign files in the key directory are not entries.
                            Err(_) => continue,
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        entries.push(Err(KesError::store_error("list", err.to_string())));
                        break;
                    }
                }
            }
            Ok(Box::new(entries.into_iter()) as KeyIter)
        })
    }
}

/// Policy persistence backed by `<root>/policy/`, disjoint from the key
/// namespace by directory layout.
pub struct FsPolicyMirror {
    dir: PathBuf,
}

impl PolicyMirror for FsPolicyMirror {
    fn save<'a>(&'a self, name: &'a Name, policy: &'a Policy) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let document = serde_json::to_vec(policy)?;
            let temp = self.dir.join(format!(".tmp-{}", std::process::id()));
            tokio::fs::write(&temp, &document)
                .await
                .map_err(|err| KesError::store_error("policy-save", err.to_string()))?;
            tokio::fs::rename(&temp, self.dir.join(name.as_str()))
                .await
                .map_err(|err| KesError::store_error("policy-save", err.to_string()))
        })
    }

    fn delete<'a>(&'a self, name: &'a Name) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.dir.join(name.as_str())).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(KesError::store_error("policy-delete", err.to_string())),
            }
        })
    }

    fn load_all<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<(Name, Policy)>>> + Send + 'a>> {
        Box::pin(async move {
            let mut reader = tokio::fs::read_dir(&self.dir)
                .await
                .map_err(|err| KesError::store_unavailable("fs", format!("policy-load: {err}")))?;
            let mut policies = Vec::new();
            while let Some(entry) =
                reader.next_entry().await.map_err(|err| KesError::store_error("policy-load", err.to_string()))?
            {
                let file_name = entry.file_name();
                let Some(raw) = file_name.to_str() else { continue };
                let Ok(name) = Name::new(raw) else { continue };
                let data = tokio::fs::read(entry.path())
                    .await
                    .map_err(|err| KesError::store_error("policy-load", err.to_string()))?;
                match serde_json::from_slice(&data) {
                    Ok(policy) => policies.push((name, policy)),
                    Err(err) => {
                        log::warn!("skipping corrupt policy document name={name} error={err}");
                    }
                }
            }
            Ok(policies)
        })
    }
}

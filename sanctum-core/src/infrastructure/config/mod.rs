//! Server configuration: YAML file layered under environment overrides.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. YAML config file
//! 3. Environment variables (`SANCTUM_` prefix, `__` as the separator,
//!    e.g. `SANCTUM_CACHE__EXPIRY__ANY=10m`)

mod duration;

pub use duration::{parse_duration, HumanDuration};

use crate::domain::Name;
use crate::foundation::{KesError, Result};
use crate::infrastructure::cache::CacheConfig;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SANCTUM_";

pub const DEFAULT_PROXY_CERT_HEADER: &str = "X-Tls-Client-Cert";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    /// Policies created at startup, keyed by policy name.
    #[serde(default)]
    pub policy: BTreeMap<String, PolicyConfig>,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub log: LogSection,
    /// Keys created at startup (existing keys are left untouched).
    #[serde(default)]
    pub keys: Vec<KeyEntry>,
    /// Exactly one backend. Defaults to the in-memory store.
    #[serde(default)]
    pub keystore: Option<KeystoreConfig>,
    #[serde(default)]
    pub api: ApiSection,
}

fn default_address() -> String {
    "0.0.0.0:7373".to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Identity that bypasses policy evaluation. Absent, empty or any
    /// value no certificate can hash to disables the bypass.
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default)]
    pub cert: Option<PathBuf>,
    /// Password for an encrypted PKCS#8 private key.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// TLS peers trusted to forward client certificates.
    #[serde(default)]
    pub identities: Vec<String>,
    #[serde(default)]
    pub header: ProxyHeaderConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyHeaderConfig {
    /// Header carrying the URL-encoded PEM client certificate.
    #[serde(default = "default_proxy_cert_header")]
    pub cert: String,
}

impl Default for ProxyHeaderConfig {
    fn default() -> Self {
        Self { cert: default_proxy_cert_header() }
    }
}

fn default_proxy_cert_header() -> String {
    DEFAULT_PROXY_CERT_HEADER.to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    /// Identities bound to this policy at startup.
    #[serde(default)]
    pub identities: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default)]
    pub expiry: ExpirySection,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExpirySection {
    #[serde(default = "default_expiry_any")]
    pub any: HumanDuration,
    #[serde(default = "default_expiry_unused")]
    pub unused: HumanDuration,
    #[serde(default)]
    pub offline: HumanDuration,
}

impl Default for ExpirySection {
    fn default() -> Self {
        Self { any: default_expiry_any(), unused: default_expiry_unused(), offline: HumanDuration::default() }
    }
}

fn default_expiry_any() -> HumanDuration {
    HumanDuration::from(Duration::from_secs(5 * 60))
}

fn default_expiry_unused() -> HumanDuration {
    HumanDuration::from(Duration::from_secs(30))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogSection {
    /// `on`/`off`: warn-and-up file logging.
    #[serde(default = "Toggle::on")]
    pub error: Toggle,
    /// `on`/`off`: audit records on the audit log target.
    #[serde(default = "Toggle::off")]
    pub audit: Toggle,
}

impl Default for LogSection {
    fn default() -> Self {
        Self { error: Toggle::on(), audit: Toggle::off() }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeyEntry {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeystoreConfig {
    /// Process-local store; keys do not survive a restart.
    Memory {},
    /// Filesystem store rooted at `path`.
    Fs { path: PathBuf },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiSection {
    /// Expose `/v1/ready` without client authentication.
    #[serde(default)]
    pub ready: bool,
}

/// `on`/`off` switch, also accepting plain booleans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Toggle(bool);

impl Toggle {
    pub fn on() -> Self {
        Self(true)
    }

    pub fn off() -> Self {
        Self(false)
    }

    pub fn enabled(&self) -> bool {
        self.0
    }
}

impl Serialize for Toggle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(if self.0 { "on" } else { "off" })
    }
}

impl<'de> Deserialize<'de> for Toggle {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error as _;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Flag(bool),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(flag) => Ok(Toggle(flag)),
            Raw::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "on" => Ok(Toggle(true)),
                "off" => Ok(Toggle(false)),
                other => Err(D::Error::custom(format!("expected \"on\" or \"off\", got {other:?}"))),
            },
        }
    }
}

impl ServerConfig {
    /// Loads configuration from the optional YAML file and the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ServerConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file_exact(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: ServerConfig =
            figment.extract().map_err(|err| KesError::ConfigError(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.address
            .parse::<SocketAddr>()
            .map_err(|err| KesError::ConfigError(format!("invalid address {:?}: {err}", self.address)))?;

        for entry in &self.keys {
            Name::new(entry.name.as_str())
                .map_err(|_| KesError::ConfigError(format!("invalid key name in keys: {:?}", entry.name)))?;
        }
        for (policy_name, policy) in &self.policy {
            Name::new(policy_name.as_str())
                .map_err(|_| KesError::ConfigError(format!("invalid policy name: {policy_name:?}")))?;
            for identity in &policy.identities {
                if identity.trim().is_empty() || identity == "unknown" {
                    return Err(KesError::ConfigError(format!(
                        "policy {policy_name:?} assigns the unknown identity"
                    )));
                }
            }
        }
        for identity in &self.tls.proxy.identities {
            if identity.trim().is_empty() || identity == "unknown" {
                return Err(KesError::ConfigError("tls.proxy.identities contains the unknown identity".to_string()));
            }
        }
        if self.tls.proxy.header.cert.trim().is_empty() {
            return Err(KesError::ConfigError("tls.proxy.header.cert must not be empty".to_string()));
        }
        if self.tls.key.is_some() != self.tls.cert.is_some() {
            return Err(KesError::ConfigError("tls.key and tls.cert must be configured together".to_string()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.address.parse().map_err(|err| KesError::ConfigError(format!("invalid address: {err}")))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            any: self.cache.expiry.any.get(),
            unused: self.cache.expiry.unused.get(),
            offline: self.cache.expiry.offline.get(),
        }
    }

    pub fn keystore(&self) -> KeystoreConfig {
        self.keystore.clone().unwrap_or(KeystoreConfig::Memory {})
    }
}

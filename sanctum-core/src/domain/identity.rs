//! Client identities and the identity → policy index.

use crate::domain::name::Name;
use crate::foundation::{KesError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use subtle::ConstantTimeEq;

/// An identity is an opaque, case-sensitive string - canonically the
/// lowercase hex SHA-256 of the client certificate's DER-encoded public
/// key. The distinguished value [`Identity::UNKNOWN`] means "no identity".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            return Self::unknown();
        }
        Self(value)
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time equality. Admin and proxy membership checks go
    /// through here so identity comparison does not leak timing.
    pub fn ct_eq(&self, other: &Identity) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// In-memory identity → policy-name index. Each identity maps to at most
/// one policy at a time.
pub struct IdentityIndex {
    inner: RwLock<HashMap<Identity, Name>>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }

    /// Binds `identity` to `policy`. Re-assigning the same pair is a
    /// no-op; re-assigning to a different policy fails until the caller
    /// forgets the identity first.
    pub fn assign(&self, policy: &Name, identity: &Identity) -> Result<()> {
        if identity.is_unknown() {
            return Err(KesError::UnknownIdentity);
        }
        let mut map = self.inner.write().unwrap_or_else(|err| err.into_inner());
        match map.get(identity) {
            Some(current) if current == policy => Ok(()),
            Some(current) => Err(KesError::IdentityAlreadyAssigned {
                identity: identity.to_string(),
                policy: current.to_string(),
            }),
            None => {
                map.insert(identity.clone(), policy.clone());
                Ok(())
            }
        }
    }

    pub fn get(&self, identity: &Identity) -> Option<Name> {
        self.inner.read().unwrap_or_else(|err| err.into_inner()).get(identity).cloned()
    }

    pub fn forget(&self, identity: &Identity) {
        self.inner.write().unwrap_or_else(|err| err.into_inner()).remove(identity);
    }

    pub fn list(&self) -> Vec<Identity> {
        self.inner.read().unwrap_or_else(|err| err.into_inner()).keys().cloned().collect()
    }

    /// Drops every binding that references `policy`.
    pub fn forget_policy(&self, policy: &Name) {
        self.inner.write().unwrap_or_else(|err| err.into_inner()).retain(|_, bound| bound != policy);
    }
}

impl Default for IdentityIndex {
    fn default() -> Self {
        Self::new()
    }
}

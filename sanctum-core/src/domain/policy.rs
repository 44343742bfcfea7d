//! Allow/deny policies over request paths.

use crate::domain::identity::Identity;
use crate::domain::name::glob_match;
use crate::foundation::{now_utc, KesError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named set of allow and deny patterns. A request path is permitted iff
/// no deny pattern matches and at least one allow pattern matches: deny
/// dominates, and an empty allow list rejects everything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Identity,
}

/// Metadata slice of a [`Policy`], returned by the describe endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyInfo {
    pub created_at: DateTime<Utc>,
    pub created_by: Identity,
}

impl Policy {
    pub fn new(allow: Vec<String>, deny: Vec<String>, created_by: Identity) -> Self {
        Self { allow, deny, created_at: now_utc(), created_by }
    }

    /// Evaluates `path` against this policy. The result does not depend on
    /// pattern order within either list.
    pub fn verify(&self, path: &str) -> Result<()> {
        if self.deny.iter().any(|pattern| glob_match(pattern, path)) {
            return Err(KesError::NotAuthorized);
        }
        if self.allow.iter().any(|pattern| glob_match(pattern, path)) {
            return Ok(());
        }
        Err(KesError::NotAuthorized)
    }

    pub fn info(&self) -> PolicyInfo {
        PolicyInfo { created_at: self.created_at, created_by: self.created_by.clone() }
    }
}

use crate::foundation::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller-supplied associated data for seal/unseal operations.
///
/// The mapping is canonically encoded with keys in lexicographic order
/// before it is fed into the AEAD as AAD, so `{"a":1,"b":2}` and
/// `{"b":2,"a":1}` authenticate the same ciphertext.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, serde_json::Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deterministic encoding: a BTreeMap serializes its keys in sorted
    /// order, which is the canonical form.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        if self.0.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::to_vec(&self.0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_encoding_sorts_keys() {
        let mut a = Context::new();
        a.insert("b", 1);
        a.insert("a", 2);

        let mut b = Context::new();
        b.insert("a", 2);
        b.insert("b", 1);

        assert_eq!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
        assert_eq!(a.canonical_bytes().unwrap(), br#"{"a":2,"b":1}"#.to_vec());
    }

    #[test]
    fn test_empty_context_encodes_empty() {
        assert!(Context::new().canonical_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_deserializes_from_json_object() {
        let ctx: Context = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        assert_eq!(ctx.canonical_bytes().unwrap(), br#"{"a":2,"b":1}"#.to_vec());
    }
}

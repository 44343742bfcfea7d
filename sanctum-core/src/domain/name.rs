//! Validated names and list patterns.
//!
//! Key and policy names are validated at every boundary: handlers validate
//! before touching an enclave, so stores and the cache may assume names are
//! well-formed.

use crate::foundation::{KesError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_NAME_LEN: usize = 80;

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c == b'-'
}

/// Name of a key or policy: `[0-9A-Za-z_.\-]{1,80}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(KesError::InvalidName(name));
        }
        if !name.bytes().all(is_name_char) {
            return Err(KesError::InvalidName(name));
        }
        // "." and ".." pass the character class but are path tokens.
        if name == "." || name == ".." {
            return Err(KesError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Name {
    type Error = KesError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Name> for String {
    fn from(value: Name) -> Self {
        value.0
    }
}

/// Glob pattern used by the list endpoints to filter names. Same character
/// set as [`Name`] plus the `*` and `?` wildcards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern(String);

impl Pattern {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if pattern.is_empty() || pattern.len() > MAX_NAME_LEN {
            return Err(KesError::InvalidPattern(pattern));
        }
        if !pattern.bytes().all(|c| is_name_char(c) || c == b'*' || c == b'?') {
            return Err(KesError::InvalidPattern(pattern));
        }
        Ok(Self(pattern))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, name: &str) -> bool {
        glob_match(&self.0, name)
    }
}

/// Single-segment glob match over a URL path: `*` matches any run of
/// non-`/` characters, `?` a single non-`/` character, `/` only itself.
/// The pattern must cover the entire path; trailing slashes are
/// significant.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    let mut pat_segments = pattern.split('/');
    let mut path_segments = path.split('/');
    loop {
        match (pat_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(pat), Some(seg)) => {
                if !segment_match(pat.as_bytes(), seg.as_bytes()) {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

fn segment_match(pat: &[u8], seg: &[u8]) -> bool {
    let mut p = 0;
    let mut i = 0;
    let mut star: Option<usize> = None;
    let mut mark = 0;
    while i < seg.len() {
        if p < pat.len() && (pat[p] == b'?' || pat[p] == seg[i]) {
            p += 1;
            i += 1;
        } else if p < pat.len() && pat[p] == b'*' {
            star = Some(p);
            mark = i;
            p += 1;
        } else if let Some(sp) = star {
            // Backtrack: let the last `*` swallow one more byte.
            p = sp + 1;
            mark += 1;
            i = mark;
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == b'*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["k1", "my-key", "my_key.v2", "A", &"x".repeat(80)] {
            assert!(Name::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "a/b", "a b", "käse", &"x".repeat(81), "a\n", ".", ".."] {
            assert!(Name::new(name).is_err(), "{name:?} should be invalid");
        }
    }

    #[test]
    fn test_glob_star_within_segment() {
        assert!(glob_match("/v1/key/decrypt/x*", "/v1/key/decrypt/x-secret"));
        assert!(glob_match("/v1/key/decrypt/*", "/v1/key/decrypt/k1"));
        assert!(!glob_match("/v1/key/*", "/v1/key/decrypt/k1"));
        assert!(!glob_match("/v1/key/decrypt/x*", "/v1/key/decrypt/y"));
    }

    #[test]
    fn test_glob_question_mark() {
        assert!(glob_match("/v1/key/get/k?", "/v1/key/get/k1"));
        assert!(!glob_match("/v1/key/get/k?", "/v1/key/get/k12"));
        assert!(!glob_match("/v1/key/get/k?", "/v1/key/get/k/"));
    }

    #[test]
    fn test_glob_full_path_anchoring() {
        assert!(!glob_match("/v1/key", "/v1/key/create/k1"));
        assert!(!glob_match("/v1/key/create/k1", "/v1/key"));
        // Trailing slashes are significant.
        assert!(!glob_match("/v1/status", "/v1/status/"));
        assert!(glob_match("/v1/status/", "/v1/status/"));
    }

    #[test]
    fn test_glob_backtracking() {
        assert!(glob_match("a*b*c", "aXbYbZc"));
        assert!(!glob_match("a*b*c", "aXbYbZ"));
        assert!(glob_match("*", "anything-without-slash"));
        assert!(!glob_match("*", "with/slash"));
    }

    #[test]
    fn test_pattern_filters_names() {
        let pattern = Pattern::new("x*").unwrap();
        assert!(pattern.matches("x-secret"));
        assert!(!pattern.matches("y-secret"));
        assert!(Pattern::new("").is_err());
        assert!(Pattern::new("a/b").is_err());
    }
}

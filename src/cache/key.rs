//! Structured cache keys of the form `namespace:entityType:entityId[:paramsHash]`.

use std::fmt;

use sha2::{Digest, Sha256};

/// Hex characters of the params digest kept in the key.
const PARAMS_HASH_LEN: usize = 16;

/// A structured cache key.
///
/// The cache treats keys as opaque; building them through this type keeps
/// two semantically different entities from ever producing the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    cache_key: String,
}

impl CacheKey {
    /// Creates a key for one entity.
    ///
    /// # Example
    /// ```
    /// use mini_cache::CacheKey;
    ///
    /// let key = CacheKey::new("users", "profile", 42);
    /// assert_eq!(key.as_str(), "users:profile:42");
    /// ```
    pub fn new(namespace: &str, entity_type: &str, entity_id: impl fmt::Display) -> Self {
        let cache_key = format!(
            "{}:{}:{}",
            safe_segment(namespace),
            safe_segment(entity_type),
            safe_segment(&entity_id.to_string())
        );
        Self { cache_key }
    }

    /// Appends a digest of request parameters, for entities cached per query.
    pub fn with_params(mut self, params: impl AsRef<[u8]>) -> Self {
        let digest = format!("{:x}", Sha256::digest(params.as_ref()));
        self.cache_key.push(':');
        self.cache_key.push_str(&digest[..PARAMS_HASH_LEN]);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.cache_key
    }

    pub fn into_string(self) -> String {
        self.cache_key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache_key)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.cache_key
    }
}

/// Percent-encodes `%` and `:` so a segment never contains a separator and
/// distinct segments stay distinct.
fn safe_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    out
}

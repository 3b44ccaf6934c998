use sha2::{Digest, Sha256};
use std::fmt;

/// Cache key: SHA-256 over the normalized prompt and a scope string
/// (usually the model id), hex encoded.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(normalized: &str, scope: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update([0x1f]);
        hasher.update(scope.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({}..)", &self.0[..8.min(self.0.len())])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

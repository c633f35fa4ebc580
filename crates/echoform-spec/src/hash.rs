//! Content hashing of specs and encoded audio.
//!
//! Hashing is synchronous and pure. [`SpecHasher`] isolates the choice of
//! primitive so a session can be given a deterministic double in tests.
//! With the `sha256` feature (default) [`default_hasher`] returns
//! [`Sha256Hasher`]; without it, [`RollingHasher`] is used. The rolling hash is
//! only guaranteed to be stable, not collision resistant.

use crate::canonical::canonical_bytes;
use crate::model::GraphSpec;
use std::fmt;
use std::sync::Arc;

/// Lowercase hex digest identifying a spec or an encoded render.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps an existing hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The full hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for logs and file names.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A byte-digest primitive.
pub trait SpecHasher: Send + Sync {
    /// Short algorithm name.
    fn name(&self) -> &'static str;

    /// Digest of `bytes`.
    fn digest(&self, bytes: &[u8]) -> ContentHash;

    /// Digest of the canonical serialization of `spec`.
    fn hash_spec(&self, spec: &GraphSpec) -> ContentHash {
        self.digest(&canonical_bytes(spec))
    }
}

/// SHA-256 via the `sha2` crate.
#[cfg(feature = "sha256")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

#[cfg(feature = "sha256")]
impl SpecHasher for Sha256Hasher {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn digest(&self, bytes: &[u8]) -> ContentHash {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        ContentHash(hex::encode(hasher.finalize()))
    }
}

/// 64-bit FNV-1a.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingHasher;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

impl SpecHasher for RollingHasher {
    fn name(&self) -> &'static str {
        "fnv1a64"
    }

    fn digest(&self, bytes: &[u8]) -> ContentHash {
        let hash = bytes.iter().fold(FNV_OFFSET, |acc, &b| {
            (acc ^ u64::from(b)).wrapping_mul(FNV_PRIME)
        });
        ContentHash(format!("{hash:016x}"))
    }
}

/// The strongest hasher compiled in.
pub fn default_hasher() -> Arc<dyn SpecHasher> {
    #[cfg(feature = "sha256")]
    {
        Arc::new(Sha256Hasher)
    }
    #[cfg(not(feature = "sha256"))]
    {
        Arc::new(RollingHasher)
    }
}

/// Hashes `spec` with the default hasher.
pub fn hash(spec: &GraphSpec) -> ContentHash {
    default_hasher().hash_spec(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeDef;

    #[test]
    fn rolling_hash_known_values() {
        assert_eq!(RollingHasher.digest(b"").as_str(), "cbf29ce484222325");
        assert_eq!(RollingHasher.digest(b"a").as_str(), "af63dc4c8601ec8c");
    }

    #[cfg(feature = "sha256")]
    #[test]
    fn sha256_known_value() {
        assert_eq!(
            Sha256Hasher.digest(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn spec_hash_changes_with_content() {
        let a = GraphSpec::default().with_node(NodeDef::new("g", "gain"));
        let b = GraphSpec::default().with_node(NodeDef::new("g", "gain").with_param("gain", 0.5));
        assert_eq!(hash(&a), hash(&a.clone()));
        assert_ne!(hash(&a), hash(&b));
        assert_eq!(RollingHasher.hash_spec(&a), RollingHasher.hash_spec(&a));
    }

    #[test]
    fn short_prefix() {
        let h = ContentHash::from_hex("0123456789abcdef");
        assert_eq!(h.short(), "0123456789ab");
        assert_eq!(ContentHash::from_hex("ab").short(), "ab");
    }
}

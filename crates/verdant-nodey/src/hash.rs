//! Content digests for node versions
//!
//! Provides [`ContentHash`], a 32-byte Blake3 digest, and [`DigestBuilder`]
//! which folds a code node's kind, literal and ordered content into a single
//! structural digest.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte content hash (Blake3)
///
/// Two code sub-trees with the same structural digest render to the same
/// text and have the same shape. Immutable and cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create hash from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != 32 {
            return Err(HashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Compute Blake3 hash of arbitrary data
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self::new(*hash.as_bytes())
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl Default for ContentHash {
    fn default() -> Self {
        Self([0; 32])
    }
}

// Persisted history files are JSON, so the hex form is the only one we write.
impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental structural digest of a code node
///
/// Every part is tagged and length-prefixed so that, for example, a literal
/// `"ab"` and two tokens `"a"`, `"b"` never collide.
#[derive(Debug, Clone)]
pub struct DigestBuilder {
    hasher: blake3::Hasher,
}

impl DigestBuilder {
    const KIND: u8 = 0;
    const LITERAL: u8 = 1;
    const CHILD: u8 = 2;
    const TOKEN: u8 = 3;

    /// Start a digest for a node of the given grammar kind
    #[must_use]
    pub fn new(kind: &str) -> Self {
        let mut builder = Self {
            hasher: blake3::Hasher::new(),
        };
        builder.part(Self::KIND, kind.as_bytes());
        builder
    }

    /// Fold in the node's literal text
    pub fn literal(&mut self, text: &str) -> &mut Self {
        self.part(Self::LITERAL, text.as_bytes());
        self
    }

    /// Fold in a child's digest (in source order)
    pub fn child(&mut self, digest: &ContentHash) -> &mut Self {
        self.part(Self::CHILD, digest.as_bytes());
        self
    }

    /// Fold in an inline syntax token (in source order)
    pub fn token(&mut self, text: &str) -> &mut Self {
        self.part(Self::TOKEN, text.as_bytes());
        self
    }

    /// Finish the digest
    #[must_use]
    pub fn finish(&self) -> ContentHash {
        ContentHash::new(*self.hasher.finalize().as_bytes())
    }

    fn part(&mut self, tag: u8, bytes: &[u8]) {
        self.hasher.update(&[tag]);
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }
}

/// Errors that can occur when working with content hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

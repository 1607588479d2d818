//! 32-byte SHA-256 hash type.
//!
//! Every identity in the ledger (facts, blocks) is a SHA-256 digest rendered
//! as 64 lowercase hex characters on the wire and in storage.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Size of a hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Length of the hex rendering of a hash.
pub const HASH_HEX_LEN: usize = 64;

/// A 32-byte SHA-256 digest.
///
/// Serializes as a plain 64-character lowercase hex string (no `0x` prefix),
/// matching the wire and database representation used across the network.
///
/// ```rust
/// use axiom_types::Hash256;
///
/// let hash = Hash256::digest(b"hello world");
/// assert_eq!(hash.to_string().len(), 64);
/// assert!(Hash256::ZERO.is_zero());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash256([u8; HASH_SIZE]);

impl Hash256 {
    /// The zero hash: `previous_hash` of the genesis block.
    pub const ZERO: Self = Self([0u8; HASH_SIZE]);

    /// Creates a hash from a 32-byte array.
    #[inline]
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Computes the SHA-256 digest of the given data.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let out = hasher.finalize();
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&out);
        Self(bytes)
    }

    /// Parses a hash from its 64-hex representation.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != HASH_HEX_LEN {
            return Err(Error::InvalidHash(format!(
                "expected {} hex characters, got {}",
                HASH_HEX_LEN,
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| Error::InvalidHash(e.to_string()))?;
        let mut arr = [0u8; HASH_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Returns the hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the hash as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Checks whether this is the all-zero hash.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_SIZE]> for Hash256 {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash256 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Convenience: SHA-256 of `data` as a 64-hex string.
#[inline]
pub fn sha256_hex(data: &[u8]) -> String {
    Hash256::digest(data).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_known_vector() {
        // SHA-256("abc")
        let hash = Hash256::digest(b"abc");
        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn zero_hash_round_trip() {
        let zero = Hash256::ZERO;
        assert!(zero.is_zero());
        assert_eq!(zero.to_hex(), "0".repeat(64));
        assert_eq!(Hash256::from_hex(&zero.to_hex()).unwrap(), zero);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(Hash256::from_hex("abcd").is_err());
        assert!(Hash256::from_hex(&"g".repeat(64)).is_err());
        assert!(Hash256::from_hex(&"a".repeat(65)).is_err());
    }

    #[test]
    fn serde_is_plain_hex() {
        let hash = Hash256::digest(b"x");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: Hash256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn ordering_is_lexicographic_on_bytes() {
        let a = Hash256::new([0u8; 32]);
        let b = Hash256::new([1u8; 32]);
        assert!(a < b);
    }
}

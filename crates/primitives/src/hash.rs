use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Length in bytes of every hash used in Kestrel.
pub const HASH_LENGTH: usize = 32;

/// A 32-byte SHA-256 digest.
///
/// Formatted as `0x`-prefixed lowercase hex, eg. `format!("{hash:#x}")`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct B256([u8; HASH_LENGTH]);

impl B256 {
    pub const ZERO: B256 = B256([0u8; HASH_LENGTH]);

    pub const fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Hashes `data` with SHA-256.
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        Self(Sha256::digest(data.as_ref()).into())
    }

    /// Creates a hash from a byte slice, returning `None` if the slice isn't exactly 32 bytes
    /// long.
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; HASH_LENGTH]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<[u8; HASH_LENGTH]> for B256 {
    fn from(value: [u8; HASH_LENGTH]) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for B256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::LowerHex for B256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str("0x")?;
        }
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Display for B256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:#x}")
    }
}

impl fmt::Debug for B256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:#x}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseHashError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected {HASH_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for B256 {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::try_from_slice(&bytes).ok_or(ParseHashError::InvalidLength(bytes.len()))
    }
}

impl Serialize for B256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{self:#x}"))
    }
}

impl<'de> Deserialize<'de> for B256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

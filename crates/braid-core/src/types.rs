use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Proof-of-work weight: log2 of the expected number of hash attempts.
/// All arithmetic on weights happens in this log2 space.
pub type Weight = f64;

// ── VertexId ─────────────────────────────────────────────────────────────────

/// 32-byte vertex identifier: BLAKE3 of the canonical vertex body plus nonce.
///
/// Ordering is plain lexicographic byte order; conflict tie-breaks rely on it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(pub [u8; 32]);

impl VertexId {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }

    /// Rebuild an id from a raw 32-byte storage key.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VertexId({}…)", &self.to_hex()[..16])
    }
}

// ── TokenUid ─────────────────────────────────────────────────────────────────

/// Identifier of a custom token. The native token is implicit (token_data 0)
/// and never listed in a transaction's token table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenUid(pub [u8; 32]);

impl fmt::Debug for TokenUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenUid({}…)", &hex::encode(self.0)[..16])
    }
}

//! Canonical hashing of ledger artifacts
//!
//! Transaction identifiers are BLAKE3 digests over a domain tag followed by the
//! canonical bincode encoding of the proposal. Every party recomputes the hash
//! from the bytes it received rather than trusting an identifier on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a hash output in bytes
pub const HASH_SIZE: usize = 32;

/// Domain separation tag for proposal hashes
const PROPOSAL_DOMAIN: &[u8] = b"iou-ledger/proposal/v1";

/// Identifier of a proposal, and of the committed transaction built from it
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash(pub [u8; HASH_SIZE]);

impl TxHash {
    /// Plain BLAKE3 digest of `data`
    pub fn digest(data: &[u8]) -> Self {
        TxHash(blake3::hash(data).into())
    }

    /// Digest of canonical proposal bytes under the proposal domain tag
    pub fn of_proposal_bytes(canonical: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(PROPOSAL_DOMAIN);
        hasher.update(canonical);
        TxHash(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for log lines
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.short())
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_tag_changes_digest() {
        let data = b"proposal";
        assert_ne!(TxHash::digest(data), TxHash::of_proposal_bytes(data));
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(
            TxHash::of_proposal_bytes(b"same"),
            TxHash::of_proposal_bytes(b"same")
        );
    }

    #[test]
    fn test_short_form() {
        let hash = TxHash::digest(b"x");
        assert_eq!(hash.short().len(), 8);
        assert!(hash.to_hex().starts_with(&hash.short()));
    }
}

//! Ed25519 identities used to sign and verify agreement artifacts
//!
//! Every party owns a [`KeyPair`]; the [`PublicKey`] half is the identity the
//! rest of the ledger refers to. Signatures are always produced over a
//! transaction hash, never over raw proposal bytes.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::hash::TxHash;
use crate::types::LedgerError;

/// Size of a public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Public half of a party's signing identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Check `signature` against `message` for this key
    ///
    /// Returns `false` both for a wrong signature and for key bytes that are
    /// not a valid curve point.
    pub fn verify(&self, message: &[u8], signature: &SignatureBytes) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = Signature::from_bytes(&signature.0);
        verifying_key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// An ed25519 signature
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SignatureBytes(pub [u8; SIGNATURE_SIZE]);

// Arrays longer than 32 have no serde derive, so signatures travel as hex.
impl Serialize for SignatureBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SignatureBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl SignatureBytes {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        let arr: [u8; SIGNATURE_SIZE] = bytes.try_into().map_err(|_| LedgerError::Encoding {
            message: format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                bytes.len()
            ),
        })?;
        Ok(SignatureBytes(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, LedgerError> {
        let bytes = hex::decode(s).map_err(|e| LedgerError::Encoding {
            message: format!("invalid signature hex: {}", e),
        })?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

/// A party's signing key pair
///
/// The secret half never leaves this struct; `ed25519_dalek::SigningKey`
/// zeroizes itself on drop.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        KeyPair {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Derive a key pair from a 32-byte seed
    ///
    /// The same seed always yields the same identity, which keeps simulated
    /// networks reproducible.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        KeyPair {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a transaction hash
    pub fn sign(&self, hash: &TxHash) -> SignatureBytes {
        SignatureBytes(self.signing_key.sign(hash.as_bytes()).to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Sign `hash` with `key`
pub fn sign(hash: &TxHash, key: &KeyPair) -> SignatureBytes {
    key.sign(hash)
}

/// Verify that `signature` over `hash` was produced by `identity`
pub fn verify(signature: &SignatureBytes, hash: &TxHash, identity: &PublicKey) -> bool {
    identity.verify(hash.as_bytes(), signature)
}

//! Signing identities and canonical hashing
//!
//! - `keys` - ed25519 key pairs, public identities and signatures
//! - `hash` - BLAKE3 transaction hashes

pub mod hash;
pub mod keys;

pub use hash::TxHash;
pub use keys::{sign, verify, KeyPair, PublicKey, SignatureBytes};

//! Party identities
//!
//! A party is addressed by name on the network and identified by its public
//! key for signing. Equality and ordering include both.

use crate::crypto::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named participant on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Party {
    /// Legal name used for addressing and reports
    pub name: String,

    /// Signing identity
    pub key: PublicKey,
}

impl Party {
    pub fn new(name: impl Into<String>, key: PublicKey) -> Self {
        Party {
            name: name.into(),
            key,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

//! Uniqueness authority
//!
//! The notary orders transactions that consume inputs and refuses any that
//! would consume an input a second time. Its signature over a transaction id is
//! what turns a fully signed artifact into a committed transaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::core::traits::UniquenessProvider;
use crate::crypto::{KeyPair, SignatureBytes, TxHash};
use crate::types::{LedgerError, Party, StateRef};

/// In-memory record of which transaction consumed each input
#[derive(Debug, Default)]
pub struct InMemoryUniquenessProvider {
    consumed: Mutex<HashMap<StateRef, TxHash>>,
}

impl InMemoryUniquenessProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction that consumed `state_ref`, if any
    pub fn consumer_of(&self, state_ref: &StateRef) -> Result<Option<TxHash>, LedgerError> {
        let consumed = self
            .consumed
            .lock()
            .map_err(|e| LedgerError::storage("uniqueness lookup", e.to_string()))?;
        Ok(consumed.get(state_ref).copied())
    }
}

impl UniquenessProvider for InMemoryUniquenessProvider {
    fn commit(&self, inputs: &[StateRef], tx_id: TxHash) -> Result<(), LedgerError> {
        let mut consumed = self
            .consumed
            .lock()
            .map_err(|e| LedgerError::storage("uniqueness commit", e.to_string()))?;

        // Check everything before marking anything
        for input in inputs {
            if let Some(first) = consumed.get(input) {
                if *first != tx_id {
                    return Err(LedgerError::conflict(*input, *first));
                }
            }
        }
        for input in inputs {
            consumed.insert(*input, tx_id);
        }
        Ok(())
    }
}

/// A notary service with its own identity
pub struct Notary {
    party: Party,
    keys: KeyPair,
    uniqueness: Box<dyn UniquenessProvider>,
    reachable: AtomicBool,
}

impl Notary {
    pub fn new(name: &str, keys: KeyPair) -> Self {
        Self::with_provider(name, keys, Box::new(InMemoryUniquenessProvider::new()))
    }

    pub fn with_provider(
        name: &str,
        keys: KeyPair,
        uniqueness: Box<dyn UniquenessProvider>,
    ) -> Self {
        Notary {
            party: Party::new(name, keys.public_key()),
            keys,
            uniqueness,
            reachable: AtomicBool::new(true),
        }
    }

    pub fn party(&self) -> &Party {
        &self.party
    }

    /// Simulate the notary going offline or coming back
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Commit `inputs` to `tx_id` and sign the id
    ///
    /// Idempotent for the same transaction, so a caller that lost the reply
    /// can resubmit.
    pub fn notarize(
        &self,
        inputs: &[StateRef],
        tx_id: TxHash,
    ) -> Result<SignatureBytes, LedgerError> {
        if !self.is_reachable() {
            warn!(tx = %tx_id.short(), "Notary unreachable");
            return Err(LedgerError::transport(&self.party.name, "notary unreachable"));
        }
        self.uniqueness.commit(inputs, tx_id)?;
        debug!(tx = %tx_id.short(), inputs = inputs.len(), "Notarised");
        Ok(self.keys.sign(&tx_id))
    }
}

impl std::fmt::Debug for Notary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notary")
            .field("party", &self.party)
            .field("reachable", &self.is_reachable())
            .finish()
    }
}

//! Participant-local ledger store
//!
//! This module provides the `Vault`, the in-memory `LedgerStore` each node
//! records committed transactions into. A transaction and every state derived
//! from it are written under a single lock, so a reader never observes a
//! transaction without its outputs or a consumed input that is still live.
//!
//! # Duplicate Handling
//!
//! Recording is keyed by transaction id. Recording the same committed
//! transaction twice is a no-op that reports `RecordOutcome::AlreadyRecorded`.
//!
//! # Relevance
//!
//! Only states naming the vault's owner as lender or borrower are tracked.
//! The transaction itself is always stored so it can be resolved later.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::core::traits::{LedgerStore, QueryCriteria, RecordOutcome, StatusFilter};
use crate::crypto::{PublicKey, TxHash};
use crate::types::{CommittedTransaction, LedgerError, ObligationState, StateAndRef, StateRef};

/// Consumption status of a tracked state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateStatus {
    Unconsumed,
    Consumed { by: TxHash },
}

#[derive(Debug, Clone)]
struct VaultEntry {
    state: ObligationState,
    status: StateStatus,
}

#[derive(Debug, Default)]
struct VaultInner {
    transactions: HashMap<TxHash, CommittedTransaction>,
    states: BTreeMap<StateRef, VaultEntry>,
}

/// In-memory store of one participant's committed transactions and states
#[derive(Debug)]
pub struct Vault {
    owner: PublicKey,
    inner: RwLock<VaultInner>,
    /// Number of upcoming `record` calls that fail with a storage error
    pending_failures: AtomicU32,
}

impl Vault {
    /// Create an empty vault tracking states relevant to `owner`
    pub fn new(owner: PublicKey) -> Self {
        Vault {
            owner,
            inner: RwLock::new(VaultInner::default()),
            pending_failures: AtomicU32::new(0),
        }
    }

    pub fn owner(&self) -> PublicKey {
        self.owner
    }

    /// Make the next `count` record attempts fail without writing anything
    pub fn fail_next_records(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Whether `id` has been recorded
    pub fn contains(&self, id: &TxHash) -> Result<bool, LedgerError> {
        Ok(self.read("contains")?.transactions.contains_key(id))
    }

    /// Number of recorded transactions
    pub fn transaction_count(&self) -> Result<usize, LedgerError> {
        Ok(self.read("count")?.transactions.len())
    }

    /// Consumption status of a tracked state
    pub fn status(&self, state_ref: &StateRef) -> Result<Option<StateStatus>, LedgerError> {
        Ok(self
            .read("status")?
            .states
            .get(state_ref)
            .map(|entry| entry.status))
    }

    fn take_injected_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn read(&self, operation: &str) -> Result<RwLockReadGuard<'_, VaultInner>, LedgerError> {
        self.inner
            .read()
            .map_err(|e| LedgerError::storage(operation, format!("lock poisoned: {}", e)))
    }

    fn write(&self, operation: &str) -> Result<RwLockWriteGuard<'_, VaultInner>, LedgerError> {
        self.inner
            .write()
            .map_err(|e| LedgerError::storage(operation, format!("lock poisoned: {}", e)))
    }
}

impl LedgerStore for Vault {
    fn record(&self, transaction: &CommittedTransaction) -> Result<RecordOutcome, LedgerError> {
        if self.take_injected_failure() {
            warn!(tx = %transaction.id.short(), "Simulated storage failure");
            return Err(LedgerError::storage("record", "simulated storage failure"));
        }

        let mut inner = self.write("record")?;
        if inner.transactions.contains_key(&transaction.id) {
            debug!(tx = %transaction.id.short(), "Transaction already recorded");
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        for input in transaction.proposal().input_refs() {
            if let Some(entry) = inner.states.get_mut(&input) {
                entry.status = StateStatus::Consumed { by: transaction.id };
            }
        }
        for output in transaction.outputs() {
            if output.state.is_participant(&self.owner) {
                inner.states.insert(
                    output.state_ref,
                    VaultEntry {
                        state: output.state,
                        status: StateStatus::Unconsumed,
                    },
                );
            }
        }
        inner
            .transactions
            .insert(transaction.id, transaction.clone());

        debug!(tx = %transaction.id.short(), "Transaction recorded");
        Ok(RecordOutcome::Recorded)
    }

    fn query(&self, criteria: &QueryCriteria) -> Result<Vec<StateAndRef>, LedgerError> {
        let inner = self.read("query")?;
        let matches = inner
            .states
            .iter()
            .filter(|(_, entry)| entry.state.state_type() == criteria.state_type)
            .filter(|(_, entry)| match (criteria.status, entry.status) {
                (StatusFilter::All, _) => true,
                (StatusFilter::Unconsumed, StateStatus::Unconsumed) => true,
                (StatusFilter::Consumed, StateStatus::Consumed { .. }) => true,
                _ => false,
            })
            .filter(|(_, entry)| {
                criteria
                    .involving
                    .map_or(true, |key| entry.state.is_participant(&key))
            })
            .filter(|(_, entry)| {
                criteria
                    .linear_id
                    .map_or(true, |id| entry.state.linear_id == id)
            })
            .map(|(state_ref, entry)| StateAndRef {
                state: entry.state.clone(),
                state_ref: *state_ref,
            })
            .collect();
        Ok(matches)
    }

    fn transaction(&self, id: &TxHash) -> Result<Option<CommittedTransaction>, LedgerError> {
        Ok(self.read("transaction")?.transactions.get(id).cloned())
    }

    fn resolve(&self, state_ref: &StateRef) -> Result<Option<ObligationState>, LedgerError> {
        let inner = self.read("resolve")?;
        if let Some(entry) = inner.states.get(state_ref) {
            return Ok(Some(entry.state.clone()));
        }
        Ok(inner
            .transactions
            .get(&state_ref.tx_id)
            .and_then(|tx| tx.proposal().outputs.get(state_ref.index as usize).cloned()))
    }
}

//! Core traits for validation rules, uniqueness ordering and ledger storage
//!
//! These are the seams where the protocol meets its external collaborators.
//! The crate ships one in-memory implementation of each; a deployment can swap
//! in a persistent store or a remote notary without touching the flows.

use crate::crypto::{PublicKey, TxHash};
use crate::types::{
    CommittedTransaction, ContractId, LedgerError, LinearId, ObligationState, Proposal,
    StateAndRef, StateRef, StateType,
};

/// A set of validation rules for one state type
///
/// Verification must be pure and deterministic: every party that checks the
/// same proposal reaches the same verdict.
pub trait Contract: Send + Sync {
    /// Identifier proposals use to reference these rules
    fn id(&self) -> ContractId;

    /// Accept the proposal or fail with a `RuleViolation`
    fn verify(&self, proposal: &Proposal) -> Result<(), LedgerError>;
}

/// Authority guaranteeing each input is consumed at most once
pub trait UniquenessProvider: Send + Sync {
    /// Atomically mark `inputs` consumed by `tx_id`
    ///
    /// Re-committing the same transaction succeeds. Any input already consumed
    /// by a different transaction fails with `ConflictError` and nothing is
    /// marked.
    fn commit(&self, inputs: &[StateRef], tx_id: TxHash) -> Result<(), LedgerError>;
}

/// Result of recording a committed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The transaction and its states were written
    Recorded,
    /// The transaction was already present; nothing changed
    AlreadyRecorded,
}

/// Which states a query returns by consumption status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Unconsumed,
    Consumed,
    All,
}

/// Filter for ledger queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCriteria {
    pub state_type: StateType,
    pub status: StatusFilter,
    /// Only states naming this party as lender or borrower
    pub involving: Option<PublicKey>,
    pub linear_id: Option<LinearId>,
}

impl QueryCriteria {
    /// All unconsumed states of `state_type`
    pub fn unconsumed(state_type: StateType) -> Self {
        QueryCriteria {
            state_type,
            status: StatusFilter::Unconsumed,
            involving: None,
            linear_id: None,
        }
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn involving(mut self, key: PublicKey) -> Self {
        self.involving = Some(key);
        self
    }

    pub fn with_linear_id(mut self, linear_id: LinearId) -> Self {
        self.linear_id = Some(linear_id);
        self
    }
}

/// A participant's local transaction and state store
///
/// `record` is the only mutating operation and must be atomic: either the
/// transaction and every state derived from it are written, or nothing is.
pub trait LedgerStore: Send + Sync {
    fn record(&self, transaction: &CommittedTransaction) -> Result<RecordOutcome, LedgerError>;

    fn query(&self, criteria: &QueryCriteria) -> Result<Vec<StateAndRef>, LedgerError>;

    fn transaction(&self, id: &TxHash) -> Result<Option<CommittedTransaction>, LedgerError>;

    /// Look up a state by reference regardless of consumption status
    fn resolve(&self, state_ref: &StateRef) -> Result<Option<ObligationState>, LedgerError>;
}

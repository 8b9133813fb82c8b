//! Ledger state types
//!
//! This module defines the obligation record itself and the references used to
//! point at a state produced by an earlier transaction.

use crate::crypto::{PublicKey, TxHash};
use crate::types::party::Party;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a ledger state type
///
/// The contract registry is keyed by this value. Only obligations exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateType {
    Obligation,
}

/// Stable identifier that survives state evolution
///
/// A settlement or amendment of an obligation keeps its linear id even though
/// it produces a brand new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinearId(pub Uuid);

impl LinearId {
    pub fn new() -> Self {
        LinearId(Uuid::new_v4())
    }
}

impl Default for LinearId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LinearId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One obligation between a lender and a borrower
///
/// Immutable once constructed. The value is a plain signed integer on purpose:
/// construction accepts anything and the contract decides what is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationState {
    /// Amount owed; must be strictly positive to pass validation
    pub value: i64,

    /// Party owed the value
    pub lender: Party,

    /// Party owing the value
    pub borrower: Party,

    /// Stable identifier of this obligation
    pub linear_id: LinearId,
}

impl ObligationState {
    /// Create a new obligation with a fresh linear id
    pub fn new(value: i64, lender: Party, borrower: Party) -> Self {
        ObligationState {
            value,
            lender,
            borrower,
            linear_id: LinearId::new(),
        }
    }

    pub fn state_type(&self) -> StateType {
        StateType::Obligation
    }

    /// Parties that must sign any transaction touching this state
    pub fn participants(&self) -> [&Party; 2] {
        [&self.lender, &self.borrower]
    }

    pub fn is_participant(&self, key: &PublicKey) -> bool {
        self.participants().iter().any(|p| p.key == *key)
    }
}

/// Pointer to an output of a committed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    /// Transaction that produced the state
    pub tx_id: TxHash,

    /// Position of the state in that transaction's outputs
    pub index: u32,
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.index)
    }
}

/// A state together with the reference it was recorded under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub state: ObligationState,
    pub state_ref: StateRef,
}

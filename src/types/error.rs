//! Error types for the IOU ledger
//!
//! This module defines every error an agreement can end with. Errors are
//! designed to be descriptive enough that the initiating caller can tell which
//! stage failed and why.
//!
//! # Error Categories
//!
//! - **Rule violations**: the proposal breaks a contract invariant. Fatal, never retried.
//! - **Verification errors**: signatures, signers or inputs do not match the proposal bytes. Fatal.
//! - **Conflicts**: the notary saw an input consumed by another transaction. Fatal for this agreement.
//! - **Transport failures**: a peer or the notary could not be reached. Transient; the caller
//!   may retry with the identical proposal.
//! - **Storage errors**: a participant could not persist a committed transaction.

use crate::crypto::TxHash;
use crate::types::protocol::ProtocolStage;
use crate::types::state::StateRef;
use thiserror::Error;

/// Main error type for the ledger
///
/// Each variant carries the context needed to diagnose the failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// A contract rule rejected the proposal
    ///
    /// Raised identically by every party that validates the same proposal.
    #[error("Rule '{rule_name}' violated: {message}")]
    RuleViolation {
        /// Stable name of the rule, e.g. `positive_value`
        rule_name: String,
        /// Human readable description
        message: String,
    },

    /// Signatures or referenced data do not match the proposal bytes
    ///
    /// Indicates tampering, a protocol bug, or a counterparty that refused to sign.
    #[error("Verification failed: {message}")]
    VerificationError {
        /// Description of the mismatch
        message: String,
    },

    /// The uniqueness authority already saw this input consumed
    #[error("Input {state_ref} already consumed by transaction {first_consumer}")]
    ConflictError {
        /// The contested input
        state_ref: StateRef,
        /// Transaction that consumed it first
        first_consumer: TxHash,
    },

    /// A peer or the notary was unreachable or did not answer in time
    #[error("Transport failure talking to {peer}: {message}")]
    TransportFailure {
        /// Name of the unreachable party
        peer: String,
        /// Description of the failure
        message: String,
    },

    /// A participant could not persist a transaction
    #[error("Storage error during {operation}: {message}")]
    StorageError {
        /// Operation that failed
        operation: String,
        /// Description of the failure
        message: String,
    },

    /// A checkpoint could not be written, read, or was out of order
    #[error("Checkpoint error: {message}")]
    CheckpointError {
        /// Description of the failure
        message: String,
    },

    /// The flow was cancelled before it signed anything
    #[error("Flow {flow_id} cancelled before signing")]
    Cancelled {
        /// Identifier of the cancelled flow
        flow_id: String,
    },

    /// The flow task ended without producing a result
    #[error("Flow aborted: {message}")]
    FlowAborted {
        /// Description of the abort
        message: String,
    },

    /// A named party is not known to the network
    #[error("Unknown party '{name}'")]
    UnknownParty {
        /// The name that was looked up
        name: String,
    },

    /// A party with the same name already exists on the network
    #[error("Party '{name}' already exists")]
    DuplicateParty {
        /// The duplicated name
        name: String,
    },

    /// Bytes could not be encoded or decoded
    #[error("Encoding error: {message}")]
    Encoding {
        /// Description of the codec failure
        message: String,
    },

    /// I/O error while reading input or writing output
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },
}

// Conversion from io::Error to LedgerError
impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

// Conversion from bincode::Error to LedgerError
impl From<bincode::Error> for LedgerError {
    fn from(error: bincode::Error) -> Self {
        LedgerError::Encoding {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create a RuleViolation error
    pub fn rule_violation(rule_name: &str, message: &str) -> Self {
        LedgerError::RuleViolation {
            rule_name: rule_name.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a VerificationError
    pub fn verification(message: impl Into<String>) -> Self {
        LedgerError::VerificationError {
            message: message.into(),
        }
    }

    /// Create a ConflictError
    pub fn conflict(state_ref: StateRef, first_consumer: TxHash) -> Self {
        LedgerError::ConflictError {
            state_ref,
            first_consumer,
        }
    }

    /// Create a TransportFailure error
    pub fn transport(peer: &str, message: impl Into<String>) -> Self {
        LedgerError::TransportFailure {
            peer: peer.to_string(),
            message: message.into(),
        }
    }

    /// Create a StorageError
    pub fn storage(operation: &str, message: impl Into<String>) -> Self {
        LedgerError::StorageError {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Create a CheckpointError
    pub fn checkpoint(message: impl Into<String>) -> Self {
        LedgerError::CheckpointError {
            message: message.into(),
        }
    }

    /// Name of the violated rule, if this is a rule violation
    pub fn rule_name(&self) -> Option<&str> {
        match self {
            LedgerError::RuleViolation { rule_name, .. } => Some(rule_name),
            _ => None,
        }
    }

    /// Whether the caller may retry the same proposal
    ///
    /// Only transport failures are transient; everything else is a verdict
    /// about the proposal itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::TransportFailure { .. })
    }
}

/// Terminal failure of an agreement flow
///
/// Names the protocol stage that was current when the flow stopped, so the
/// caller can tell a local validation failure from a notary conflict.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("agreement failed at {stage}: {error}")]
pub struct FlowFailure {
    /// Stage the flow was in when it failed
    pub stage: ProtocolStage,
    /// The underlying error
    #[source]
    pub error: LedgerError,
}

impl FlowFailure {
    pub fn new(stage: ProtocolStage, error: LedgerError) -> Self {
        FlowFailure { stage, error }
    }

    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}

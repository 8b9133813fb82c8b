//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `party`: Party identities
//! - `state`: Obligation states and state references
//! - `transaction`: Proposals, signed artifacts and committed transactions
//! - `protocol`: Protocol stages and flow states
//! - `request`: Agreement requests from batch input
//! - `error`: Error types for the ledger

pub mod error;
pub mod party;
pub mod protocol;
pub mod request;
pub mod state;
pub mod transaction;

pub use error::{FlowFailure, LedgerError};
pub use party::Party;
pub use protocol::{FlowRole, ProtocolStage, ProtocolState};
pub use request::{AgreementRequest, RequestAction};
pub use state::{LinearId, ObligationState, StateAndRef, StateRef, StateType};
pub use transaction::{Command, CommittedTransaction, ContractId, Proposal, SignedArtifact};

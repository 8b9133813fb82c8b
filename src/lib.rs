//! IOU Ledger Library
//! # Overview
//!
//! This library implements a two-party agreement protocol over a shared ledger:
//! a lender and a borrower jointly sign an IOU, a notary orders it against any
//! conflicting transaction, and both parties record the identical committed
//! transaction in their own vaults.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (ObligationState, Proposal, SignedArtifact, errors)
//! - [`crypto`] - ed25519 identities and BLAKE3 transaction hashes
//! - [`core`] - Protocol components:
//!   - [`core::contract`] - Obligation contract rules
//!   - [`core::builder`] - Proposal construction
//!   - [`core::flow`] - Initiator and acceptor state machines
//!   - [`core::finality`] - Notarisation and recording
//!   - [`core::network`] - Simulated nodes, sessions and notary
//! - [`io`] - CSV request parsing and obligation report output
//! - [`strategy`] - Sequential and concurrent batch pipelines
//! - [`cli`] - CLI arguments parsing
//!
//! # Protocol Stages
//!
//! The initiator moves through `BUILT`, `LOCALLY_VALIDATED`, `INITIATOR_SIGNED`,
//! `SENT`, `COUNTERPARTY_SIGNED`, `MERGED`, `FINALIZING` and `RECORDED`. The
//! acceptor moves through `SENT`, `COUNTERPARTY_VALIDATED`, `COUNTERPARTY_SIGNED`,
//! `FINALIZING` and `RECORDED`. Either may end in `REJECTED`, with the stage
//! at which it stopped.
//!
//! # Guarantees
//!
//! - Nothing is recorded anywhere unless the contract accepted the proposal,
//!   every required signer signed it and the notary committed it
//! - A recorded transaction is byte-identical at every participant
//! - No state is consumed by two committed transactions

// Module declarations
pub mod cli;
pub mod core;
pub mod crypto;
pub mod io;
pub mod strategy;
pub mod types;

pub use core::{AgreementEngine, FlowHandle, Node, ProtocolConfig, SimNetwork};
pub use io::write_obligations_csv;
pub use types::{
    AgreementRequest, CommittedTransaction, FlowFailure, LedgerError, ObligationState, Party,
    Proposal, ProtocolStage, SignedArtifact,
};

//! Core business logic module
//!
//! This module contains the agreement protocol components:
//! - `traits` - Trait abstractions for contracts, uniqueness and ledger storage
//! - `contract` - Obligation contract rules and the contract registry
//! - `builder` - Proposal construction for issuance and settlement
//! - `vault` - Per-node ledger of committed transactions and states
//! - `notary` - Double-spend prevention and notarisation
//! - `checkpoint` - Durable flow progress
//! - `network` - Simulated nodes, sessions and message delivery
//! - `finality` - Notarisation, recording and distribution of committed transactions
//! - `flow` - Initiator and acceptor state machines
//! - `engine` - Request processing orchestration
//! - `batch_processor` - Concurrent batch processing partitioned by party pair

pub mod batch_processor;
pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod contract;
pub mod engine;
pub mod finality;
pub mod flow;
pub mod network;
pub mod notary;
pub mod traits;
pub mod vault;

pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use builder::TransactionBuilder;
pub use checkpoint::{Checkpoint, CheckpointStore, FlowId};
pub use config::ProtocolConfig;
pub use contract::{validate, ContractRegistry, ObligationContract};
pub use engine::{AgreementEngine, Holding};
pub use finality::FinalityService;
pub use flow::FlowHandle;
pub use network::{FlowMessage, FlowSession, Node, SimNetwork};
pub use notary::{InMemoryUniquenessProvider, Notary};
pub use traits::{Contract, LedgerStore, QueryCriteria, RecordOutcome, UniquenessProvider};
pub use vault::Vault;

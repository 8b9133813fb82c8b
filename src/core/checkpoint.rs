//! Durable flow checkpoints
//!
//! Every protocol transition is written here before the flow acts on it, as a
//! bincode-encoded snapshot keyed by flow id. A restarted node reads its
//! non-terminal checkpoints back and resumes each flow from its last stage
//! instead of relying on an in-memory continuation.
//!
//! # Transitions
//!
//! A checkpoint may only move to the successor of its stage on its role's path,
//! be re-saved at the same stage with updated payload, or become `Rejected`.
//! Terminal checkpoints never change again.

use std::collections::BTreeSet;
use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::TxHash;
use crate::types::{
    CommittedTransaction, FlowRole, LedgerError, Party, Proposal, ProtocolStage, ProtocolState,
    SignedArtifact,
};

/// Identifier of one flow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub Uuid);

impl FlowId {
    pub fn new() -> Self {
        FlowId(Uuid::new_v4())
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a flow at its last durable stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub flow_id: FlowId,
    pub role: FlowRole,
    pub counterparty: Party,
    pub state: ProtocolState,
    pub proposal: Proposal,
    /// This party's current artifact: own signature, later merged
    pub artifact: Option<SignedArtifact>,
    /// Artifact returned by the counterparty, before merging
    pub received: Option<SignedArtifact>,
    pub committed: Option<CommittedTransaction>,
}

impl Checkpoint {
    pub fn new(role: FlowRole, counterparty: Party, proposal: Proposal) -> Self {
        Checkpoint {
            flow_id: FlowId::new(),
            role,
            counterparty,
            state: ProtocolState::Active(role.entry()),
            proposal,
            artifact: None,
            received: None,
            committed: None,
        }
    }

    pub fn stage(&self) -> ProtocolStage {
        self.state.stage()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `stage`; validity is enforced when saving
    pub fn advance(&mut self, stage: ProtocolStage) {
        self.state = ProtocolState::Active(stage);
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.state = ProtocolState::Rejected {
            stage: self.stage(),
            reason: reason.into(),
        };
    }

    pub fn tx_id(&self) -> Result<TxHash, LedgerError> {
        self.proposal.id()
    }

    fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::serialize(self)
            .map_err(|e| LedgerError::checkpoint(format!("encode {}: {}", self.flow_id, e)))
    }

    fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        bincode::deserialize(bytes).map_err(|e| LedgerError::checkpoint(format!("decode: {}", e)))
    }
}

fn check_transition(previous: &Checkpoint, next: &Checkpoint) -> Result<(), LedgerError> {
    if previous.role != next.role {
        return Err(LedgerError::checkpoint(format!(
            "flow {} changed role",
            next.flow_id
        )));
    }
    if previous.is_terminal() {
        return Err(LedgerError::checkpoint(format!(
            "flow {} already finished in {}",
            next.flow_id, previous.state
        )));
    }
    match &next.state {
        ProtocolState::Rejected { .. } => Ok(()),
        ProtocolState::Active(stage) => {
            let from = previous.stage();
            if *stage == from || next.role.successor(from) == Some(*stage) {
                Ok(())
            } else {
                Err(LedgerError::checkpoint(format!(
                    "flow {} cannot move from {} to {}",
                    next.flow_id, from, stage
                )))
            }
        }
    }
}

/// Node-local checkpoint storage
///
/// Live flows and finished flows are kept apart so lookups by transaction
/// only touch flows that can still move. `by_tx` indexes the live ones.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    active: DashMap<FlowId, Vec<u8>>,
    finished: DashMap<FlowId, Vec<u8>>,
    by_tx: DashMap<(FlowRole, TxHash), BTreeSet<FlowId>>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist `checkpoint`, refusing out-of-order transitions
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), LedgerError> {
        let bytes = checkpoint.encode()?;
        let key = (checkpoint.role, checkpoint.tx_id()?);
        if let Some(done) = self.finished.get(&checkpoint.flow_id) {
            check_transition(&Checkpoint::decode(done.value())?, checkpoint)?;
        }
        match self.active.entry(checkpoint.flow_id) {
            Entry::Occupied(mut occupied) => {
                let previous = Checkpoint::decode(occupied.get())?;
                check_transition(&previous, checkpoint)?;
                if checkpoint.is_terminal() {
                    occupied.remove();
                    self.unindex(&key, checkpoint.flow_id);
                    self.finished.insert(checkpoint.flow_id, bytes);
                } else {
                    occupied.insert(bytes);
                }
            }
            Entry::Vacant(vacant) => {
                if checkpoint.state != ProtocolState::Active(checkpoint.role.entry()) {
                    return Err(LedgerError::checkpoint(format!(
                        "flow {} must start at {}",
                        checkpoint.flow_id,
                        checkpoint.role.entry()
                    )));
                }
                vacant.insert(bytes);
                self.by_tx.entry(key).or_default().insert(checkpoint.flow_id);
            }
        }
        Ok(())
    }

    fn unindex(&self, key: &(FlowRole, TxHash), flow_id: FlowId) {
        if let Some(mut flows) = self.by_tx.get_mut(key) {
            flows.remove(&flow_id);
        }
        self.by_tx.remove_if(key, |_, flows| flows.is_empty());
    }

    pub fn load(&self, flow_id: &FlowId) -> Result<Option<Checkpoint>, LedgerError> {
        self.active
            .get(flow_id)
            .or_else(|| self.finished.get(flow_id))
            .map(|bytes| Checkpoint::decode(bytes.value()))
            .transpose()
    }

    /// Every checkpoint, live and finished, ordered by flow id
    pub fn all(&self) -> Result<Vec<Checkpoint>, LedgerError> {
        let mut checkpoints = self
            .active
            .iter()
            .chain(self.finished.iter())
            .map(|entry| Checkpoint::decode(entry.value()))
            .collect::<Result<Vec<_>, _>>()?;
        checkpoints.sort_by_key(|checkpoint| checkpoint.flow_id);
        Ok(checkpoints)
    }

    /// Non-terminal checkpoints for `role`, ordered by flow id
    pub fn in_flight(&self, role: FlowRole) -> Result<Vec<Checkpoint>, LedgerError> {
        let mut checkpoints = Vec::new();
        for entry in self.active.iter() {
            let checkpoint = Checkpoint::decode(entry.value())?;
            if checkpoint.role == role {
                checkpoints.push(checkpoint);
            }
        }
        checkpoints.sort_by_key(|checkpoint| checkpoint.flow_id);
        Ok(checkpoints)
    }

    /// Non-terminal checkpoint of `role` for transaction `tx_id`
    pub fn find_in_flight(
        &self,
        role: FlowRole,
        tx_id: &TxHash,
    ) -> Result<Option<Checkpoint>, LedgerError> {
        let flow_id = match self
            .by_tx
            .get(&(role, *tx_id))
            .and_then(|flows| flows.first().copied())
        {
            Some(flow_id) => flow_id,
            None => return Ok(None),
        };
        self.active
            .get(&flow_id)
            .map(|bytes| Checkpoint::decode(bytes.value()))
            .transpose()
    }

    /// Number of transactions with a live flow
    pub fn in_flight_count(&self) -> usize {
        self.by_tx.len()
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.finished.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.finished.is_empty()
    }
}

//! Simulated network of ledger nodes
//!
//! `SimNetwork` stands in for peer discovery, transport and the notary service.
//! Every message crosses the network as bincode bytes and is decoded again on
//! arrival, so nothing a flow receives is shared memory with the sender.
//!
//! # Architecture
//!
//! ```text
//! SimNetwork
//!     ├── nodes: DashMap<PublicKey, Node>   (vault + checkpoints + sessions)
//!     ├── names: DashMap<String, PublicKey> (addressing)
//!     ├── disconnected: DashSet<PublicKey>  (simulated partitions)
//!     └── Arc<Notary>                       (uniqueness authority)
//! ```
//!
//! # Sessions
//!
//! A session is a pair of inboxes sharing one `SessionId`, one per node. A
//! message for an unknown session either starts a responder flow (a proposal or
//! a finality broadcast) or is dropped.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::builder::{build, build_settlement};
use crate::core::checkpoint::{Checkpoint, CheckpointStore, FlowId};
use crate::core::config::ProtocolConfig;
use crate::core::finality::FinalityService;
use crate::core::flow::{acceptor, initiator, FlowHandle};
use crate::core::notary::Notary;
use crate::core::traits::{LedgerStore, QueryCriteria};
use crate::core::vault::Vault;
use crate::crypto::{KeyPair, PublicKey, TxHash};
use crate::types::{
    CommittedTransaction, FlowRole, LedgerError, Party, Proposal, ProtocolStage, SignedArtifact,
    StateAndRef, StateType,
};

/// Name the network's notary is registered under
pub const NOTARY_NAME: &str = "Notary";

/// Deterministic identity for `name`
pub fn keys_for(name: &str) -> KeyPair {
    KeyPair::from_seed(blake3::hash(name.as_bytes()).as_bytes())
}

/// Identifier shared by both ends of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages exchanged by agreement flows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowMessage {
    /// Initiator to acceptor: the proposal carrying the initiator's signature
    ProposalWithPartialSignatures(SignedArtifact),

    /// Acceptor to initiator: the proposal carrying every signature the acceptor holds
    ProposalWithAllSignatures(SignedArtifact),

    /// Either side: the agreement is over and will not be finalised
    Rejected {
        stage: ProtocolStage,
        reason: String,
    },

    /// Initiator to participants: the notarised transaction to record
    FinalityBroadcast(CommittedTransaction),

    FinalityAck { tx_id: TxHash },

    FinalityNack { tx_id: TxHash, reason: String },
}

impl FlowMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            FlowMessage::ProposalWithPartialSignatures(_) => "ProposalWithPartialSignatures",
            FlowMessage::ProposalWithAllSignatures(_) => "ProposalWithAllSignatures",
            FlowMessage::Rejected { .. } => "Rejected",
            FlowMessage::FinalityBroadcast(_) => "FinalityBroadcast",
            FlowMessage::FinalityAck { .. } => "FinalityAck",
            FlowMessage::FinalityNack { .. } => "FinalityNack",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    session: SessionId,
    from: Party,
    message: FlowMessage,
}

struct SessionEntry {
    peer: PublicKey,
    inbox: mpsc::UnboundedSender<FlowMessage>,
}

/// One end of a conversation with a peer
///
/// Dropping the session unregisters its inbox; later messages for it are
/// discarded.
pub struct FlowSession {
    id: SessionId,
    node: Node,
    peer: Party,
    inbox: mpsc::UnboundedReceiver<FlowMessage>,
    timeout: Duration,
}

impl FlowSession {
    fn open(node: &Node, id: SessionId, peer: Party) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        node.inner.sessions.insert(
            id,
            SessionEntry {
                peer: peer.key,
                inbox: sender,
            },
        );
        FlowSession {
            id,
            node: node.clone(),
            peer,
            inbox,
            timeout: node.config().response_timeout,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> &Party {
        &self.peer
    }

    pub fn send(&self, message: FlowMessage) -> Result<(), LedgerError> {
        let network = self.node.network()?;
        network.deliver(&self.node.inner.party, &self.peer, self.id, message)
    }

    /// Wait for the next message, failing with a transport error on timeout
    pub async fn receive(&mut self) -> Result<FlowMessage, LedgerError> {
        match tokio::time::timeout(self.timeout, self.inbox.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(LedgerError::transport(&self.peer.name, "session closed")),
            Err(_) => Err(LedgerError::transport(
                &self.peer.name,
                format!("no response within {}ms", self.timeout.as_millis()),
            )),
        }
    }
}

impl Drop for FlowSession {
    fn drop(&mut self) {
        self.node.inner.sessions.remove(&self.id);
    }
}

impl fmt::Debug for FlowSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowSession")
            .field("id", &self.id)
            .field("node", &self.node.inner.party.name)
            .field("peer", &self.peer.name)
            .finish()
    }
}

struct NodeInner {
    party: Party,
    keys: KeyPair,
    vault: Vault,
    checkpoints: CheckpointStore,
    sessions: DashMap<SessionId, SessionEntry>,
    network: Weak<NetworkInner>,
    config: ProtocolConfig,
}

/// Handle to one participant on the network
///
/// Cheap to clone; all clones share the same vault, checkpoints and sessions.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    pub fn party(&self) -> &Party {
        &self.inner.party
    }

    pub fn name(&self) -> &str {
        &self.inner.party.name
    }

    pub fn vault(&self) -> &Vault {
        &self.inner.vault
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.inner.checkpoints
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.inner.config
    }

    /// Add this node's signature to `artifact`
    pub fn sign(&self, artifact: &mut SignedArtifact) -> Result<TxHash, LedgerError> {
        artifact.sign_with(&self.inner.keys)
    }

    /// Unconsumed obligations this node is party to
    pub fn obligations(&self) -> Result<Vec<StateAndRef>, LedgerError> {
        self.vault()
            .query(&QueryCriteria::unconsumed(StateType::Obligation))
    }

    /// Open a fresh session with `peer`
    pub fn initiate_session(&self, peer: &Party) -> FlowSession {
        FlowSession::open(self, SessionId::new(), peer.clone())
    }

    /// Finality service backed by the network's notary
    pub fn finality(&self) -> Result<FinalityService, LedgerError> {
        let network = self.network()?;
        Ok(FinalityService::new(
            Arc::clone(&network.notary),
            self.inner.config.clone(),
        ))
    }

    pub(crate) fn network(&self) -> Result<Arc<NetworkInner>, LedgerError> {
        self.inner
            .network
            .upgrade()
            .ok_or_else(|| LedgerError::transport(&self.inner.party.name, "network shut down"))
    }

    /// Issue an obligation of `value` owed by `borrower` to this node
    pub fn start_issue(&self, value: i64, borrower: &Party) -> Result<FlowHandle, LedgerError> {
        let notary = self.network()?.notary.party().clone();
        let proposal = build(value, self.party().clone(), borrower.clone(), notary);
        Ok(self.start_agreement(proposal, borrower))
    }

    /// Settle an outstanding obligation this node is party to
    pub fn start_settle(&self, obligation: StateAndRef) -> Result<FlowHandle, LedgerError> {
        let counterparty = if obligation.state.lender.key == self.party().key {
            obligation.state.borrower.clone()
        } else if obligation.state.borrower.key == self.party().key {
            obligation.state.lender.clone()
        } else {
            return Err(LedgerError::verification(format!(
                "{} is not a party to obligation {}",
                self.name(),
                obligation.state.linear_id
            )));
        };
        let notary = self.network()?.notary.party().clone();
        let proposal = build_settlement(obligation, notary);
        Ok(self.start_agreement(proposal, &counterparty))
    }

    /// Run the initiator role for an already built proposal
    pub fn start_agreement(&self, proposal: Proposal, counterparty: &Party) -> FlowHandle {
        let checkpoint = Checkpoint::new(FlowRole::Initiator, counterparty.clone(), proposal);
        info!(
            flow_id = %checkpoint.flow_id,
            node = %self.name(),
            peer = %counterparty.name,
            "Starting agreement"
        );
        self.spawn_initiator(checkpoint, true)
    }

    /// Resume one non-terminal initiator flow from its checkpoint
    pub fn resume_flow(&self, flow_id: &FlowId) -> Result<FlowHandle, LedgerError> {
        let checkpoint = self
            .checkpoints()
            .load(flow_id)?
            .ok_or_else(|| LedgerError::checkpoint(format!("no checkpoint for flow {}", flow_id)))?;
        if checkpoint.role != FlowRole::Initiator || checkpoint.is_terminal() {
            return Err(LedgerError::checkpoint(format!(
                "flow {} is not a resumable initiator ({})",
                flow_id, checkpoint.state
            )));
        }
        info!(flow_id = %flow_id, stage = %checkpoint.stage(), "Resuming flow");
        Ok(self.spawn_initiator(checkpoint, false))
    }

    /// Resume every non-terminal initiator flow
    pub fn resume_flows(&self) -> Result<Vec<FlowHandle>, LedgerError> {
        self.checkpoints()
            .in_flight(FlowRole::Initiator)?
            .iter()
            .map(|checkpoint| self.resume_flow(&checkpoint.flow_id))
            .collect()
    }

    /// Notarise a fully signed artifact and record it at every participant
    ///
    /// Safe to call again for a transaction that is already recorded: the
    /// notary and every vault treat the repeat as a no-op.
    pub async fn finalize(
        &self,
        artifact: SignedArtifact,
    ) -> Result<CommittedTransaction, LedgerError> {
        let finality = self.finality()?;
        let committed = finality.notarise(&artifact)?;
        finality.record_with_retry(self.vault(), &committed).await?;

        let peers: Vec<Party> = artifact
            .proposal
            .participants()
            .into_iter()
            .filter(|party| party.key != self.party().key)
            .cloned()
            .collect();
        for peer in peers {
            let mut session = self.initiate_session(&peer);
            finality.distribute(&mut session, &committed).await?;
        }
        Ok(committed)
    }

    fn spawn_initiator(&self, checkpoint: Checkpoint, fresh: bool) -> FlowHandle {
        let cancel = CancellationToken::new();
        let flow_id = checkpoint.flow_id;
        let proposal = checkpoint.proposal.clone();
        let join = tokio::spawn(initiator::run(
            self.clone(),
            checkpoint,
            fresh,
            cancel.clone(),
        ));
        FlowHandle::new(flow_id, self.clone(), proposal, cancel, join)
    }

    fn receive(&self, envelope: Envelope) {
        if let Some(entry) = self.inner.sessions.get(&envelope.session) {
            if entry.peer != envelope.from.key {
                warn!(
                    node = %self.name(),
                    session = %envelope.session,
                    from = %envelope.from.name,
                    "Dropping message from unexpected peer"
                );
                return;
            }
            if entry.inbox.send(envelope.message).is_err() {
                debug!(node = %self.name(), session = %envelope.session, "Session inbox closed");
            }
            return;
        }

        match envelope.message {
            FlowMessage::ProposalWithPartialSignatures(artifact) => {
                let session = FlowSession::open(self, envelope.session, envelope.from);
                let node = self.clone();
                tokio::spawn(async move {
                    if let Err(failure) = acceptor::run(node, session, artifact).await {
                        warn!(%failure, "Acceptor flow ended");
                    }
                });
            }
            FlowMessage::FinalityBroadcast(committed) => {
                let session = FlowSession::open(self, envelope.session, envelope.from);
                let node = self.clone();
                tokio::spawn(async move {
                    if let Err(error) = acceptor::receive_finality(node, session, committed).await
                    {
                        warn!(%error, "Finality responder ended");
                    }
                });
            }
            other => {
                debug!(
                    node = %self.name(),
                    session = %envelope.session,
                    kind = other.kind(),
                    "Dropping message for unknown session"
                );
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("party", &self.inner.party)
            .finish()
    }
}

pub(crate) struct NetworkInner {
    nodes: DashMap<PublicKey, Node>,
    names: DashMap<String, PublicKey>,
    disconnected: DashSet<PublicKey>,
    notary: Arc<Notary>,
    config: ProtocolConfig,
}

impl NetworkInner {
    fn deliver(
        &self,
        from: &Party,
        to: &Party,
        session: SessionId,
        message: FlowMessage,
    ) -> Result<(), LedgerError> {
        if self.disconnected.contains(&from.key) || self.disconnected.contains(&to.key) {
            return Err(LedgerError::transport(&to.name, "peer disconnected"));
        }
        let node = self
            .nodes
            .get(&to.key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LedgerError::transport(&to.name, "no route to peer"))?;

        let kind = message.kind();
        let bytes = bincode::serialize(&Envelope {
            session,
            from: from.clone(),
            message,
        })?;
        let envelope: Envelope = bincode::deserialize(&bytes)?;
        debug!(
            from = %from.name,
            to = %to.name,
            kind,
            bytes = bytes.len(),
            "Delivering message"
        );
        node.receive(envelope);
        Ok(())
    }
}

/// In-process network of nodes sharing one notary
#[derive(Clone)]
pub struct SimNetwork {
    inner: Arc<NetworkInner>,
}

impl SimNetwork {
    pub fn new(config: ProtocolConfig) -> Self {
        let notary = Notary::new(NOTARY_NAME, keys_for(NOTARY_NAME));
        SimNetwork {
            inner: Arc::new(NetworkInner {
                nodes: DashMap::new(),
                names: DashMap::new(),
                disconnected: DashSet::new(),
                notary: Arc::new(notary),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.inner.config
    }

    /// Add a node named `name` with a deterministic identity
    pub fn create_node(&self, name: &str) -> Result<Node, LedgerError> {
        if name == NOTARY_NAME {
            return Err(LedgerError::DuplicateParty {
                name: name.to_string(),
            });
        }
        let keys = keys_for(name);
        let party = Party::new(name, keys.public_key());

        match self.inner.names.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(LedgerError::DuplicateParty {
                name: name.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let node = Node {
                    inner: Arc::new(NodeInner {
                        vault: Vault::new(party.key),
                        party: party.clone(),
                        keys,
                        checkpoints: CheckpointStore::new(),
                        sessions: DashMap::new(),
                        network: Arc::downgrade(&self.inner),
                        config: self.inner.config.clone(),
                    }),
                };
                self.inner.nodes.insert(party.key, node.clone());
                vacant.insert(party.key);
                debug!(node = %name, key = %party.key, "Node created");
                Ok(node)
            }
        }
    }

    pub fn node(&self, name: &str) -> Result<Node, LedgerError> {
        let key = self
            .inner
            .names
            .get(name)
            .map(|entry| *entry.value())
            .ok_or_else(|| LedgerError::UnknownParty {
                name: name.to_string(),
            })?;
        self.inner
            .nodes
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LedgerError::UnknownParty {
                name: name.to_string(),
            })
    }

    pub fn node_or_create(&self, name: &str) -> Result<Node, LedgerError> {
        match self.node(name) {
            Ok(node) => Ok(node),
            Err(LedgerError::UnknownParty { .. }) => match self.create_node(name) {
                // Lost a race with another task creating the same node
                Err(LedgerError::DuplicateParty { .. }) => self.node(name),
                other => other,
            },
            Err(e) => Err(e),
        }
    }

    /// Every node, ordered by name
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .inner
            .nodes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by(|a, b| a.name().cmp(b.name()));
        nodes
    }

    pub fn notary(&self) -> Arc<Notary> {
        Arc::clone(&self.inner.notary)
    }

    pub fn notary_party(&self) -> Party {
        self.inner.notary.party().clone()
    }

    /// Cut `name` off from every peer until reconnected
    pub fn disconnect(&self, name: &str) -> Result<(), LedgerError> {
        let node = self.node(name)?;
        self.inner.disconnected.insert(node.party().key);
        info!(node = %name, "Node disconnected");
        Ok(())
    }

    pub fn reconnect(&self, name: &str) -> Result<(), LedgerError> {
        let node = self.node(name)?;
        self.inner.disconnected.remove(&node.party().key);
        info!(node = %name, "Node reconnected");
        Ok(())
    }

    pub fn set_notary_reachable(&self, reachable: bool) {
        self.inner.notary.set_reachable(reachable);
    }
}

impl Default for SimNetwork {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

impl fmt::Debug for SimNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimNetwork")
            .field("nodes", &self.inner.nodes.len())
            .field("notary", &self.inner.notary.party().name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup_nodes() {
        let network = SimNetwork::default();
        let a = network.create_node("PartyA").unwrap();

        assert_eq!(network.node("PartyA").unwrap().party(), a.party());
        assert_eq!(a.party().key, keys_for("PartyA").public_key());
        assert!(matches!(
            network.node("PartyZ"),
            Err(LedgerError::UnknownParty { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let network = SimNetwork::default();
        network.create_node("PartyA").unwrap();
        assert!(matches!(
            network.create_node("PartyA"),
            Err(LedgerError::DuplicateParty { .. })
        ));
        assert!(matches!(
            network.create_node(NOTARY_NAME),
            Err(LedgerError::DuplicateParty { .. })
        ));
        assert_eq!(
            network.node_or_create("PartyA").unwrap().party(),
            network.node("PartyA").unwrap().party()
        );
    }

    #[test]
    fn test_nodes_sorted_by_name() {
        let network = SimNetwork::default();
        for name in ["PartyC", "PartyA", "PartyB"] {
            network.create_node(name).unwrap();
        }
        let names: Vec<String> = network
            .nodes()
            .iter()
            .map(|node| node.name().to_string())
            .collect();
        assert_eq!(names, vec!["PartyA", "PartyB", "PartyC"]);
    }

    #[tokio::test]
    async fn test_session_messages_cross_the_wire() {
        let network = SimNetwork::default();
        let a = network.create_node("PartyA").unwrap();
        let b = network.create_node("PartyB").unwrap();

        let mut on_a = a.initiate_session(b.party());
        let on_b = FlowSession::open(&b, on_a.id(), a.party().clone());

        let tx_id = TxHash([3; 32]);
        on_b.send(FlowMessage::FinalityAck { tx_id }).unwrap();
        assert_eq!(
            on_a.receive().await.unwrap(),
            FlowMessage::FinalityAck { tx_id }
        );
    }

    #[tokio::test]
    async fn test_disconnected_peer_is_transport_failure() {
        let network = SimNetwork::default();
        let a = network.create_node("PartyA").unwrap();
        let b = network.create_node("PartyB").unwrap();
        network.disconnect("PartyB").unwrap();

        let session = a.initiate_session(b.party());
        let err = session
            .send(FlowMessage::FinalityAck {
                tx_id: TxHash([0; 32]),
            })
            .unwrap_err();
        assert!(err.is_retryable());

        network.reconnect("PartyB").unwrap();
        assert!(session
            .send(FlowMessage::FinalityAck {
                tx_id: TxHash([0; 32]),
            })
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_times_out() {
        let network = SimNetwork::new(ProtocolConfig::new(Duration::from_millis(20), 1, None));
        let a = network.create_node("PartyA").unwrap();
        let b = network.create_node("PartyB").unwrap();

        let mut session = a.initiate_session(b.party());
        let err = session.receive().await.unwrap_err();
        assert!(matches!(err, LedgerError::TransportFailure { .. }));
    }

    #[test]
    fn test_dropped_session_unregisters() {
        let network = SimNetwork::default();
        let a = network.create_node("PartyA").unwrap();
        let b = network.create_node("PartyB").unwrap();

        let session = a.initiate_session(b.party());
        let id = session.id();
        assert!(a.inner.sessions.contains_key(&id));
        drop(session);
        assert!(!a.inner.sessions.contains_key(&id));
    }
}

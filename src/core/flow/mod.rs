//! Agreement flows
//!
//! The initiator and acceptor roles of the signature-collection protocol. Both
//! run as independent tokio tasks that checkpoint every transition and suspend
//! only while waiting on their session, so a slow peer never blocks unrelated
//! flows on the same node.
//!
//! - `initiator` - builds, validates, signs, collects the counterparty's
//!   signature and drives finality
//! - `acceptor` - re-validates a received proposal, co-signs it and records the
//!   committed result

pub mod acceptor;
pub mod initiator;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::checkpoint::FlowId;
use crate::core::config::ProtocolConfig;
use crate::core::contract;
use crate::core::network::Node;
use crate::core::traits::LedgerStore;
use crate::types::{
    CommittedTransaction, FlowFailure, LedgerError, Proposal, ProtocolStage,
};

/// Handle to a running initiator flow
#[derive(Debug)]
pub struct FlowHandle {
    flow_id: FlowId,
    node: Node,
    proposal: Proposal,
    cancel: CancellationToken,
    join: JoinHandle<Result<CommittedTransaction, FlowFailure>>,
}

impl FlowHandle {
    pub(crate) fn new(
        flow_id: FlowId,
        node: Node,
        proposal: Proposal,
        cancel: CancellationToken,
        join: JoinHandle<Result<CommittedTransaction, FlowFailure>>,
    ) -> Self {
        FlowHandle {
            flow_id,
            node,
            proposal,
            cancel,
            join,
        }
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// The proposal this flow is agreeing on
    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    /// Abandon the agreement if the initiator has not signed yet
    ///
    /// Has no effect once the initiator's signature exists.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the flow to finish
    pub async fn result(self) -> Result<CommittedTransaction, FlowFailure> {
        match self.join.await {
            Ok(result) => result,
            Err(join_error) => {
                let stage = self
                    .node
                    .checkpoints()
                    .load(&self.flow_id)
                    .ok()
                    .flatten()
                    .map(|checkpoint| checkpoint.stage())
                    .unwrap_or(ProtocolStage::Built);
                Err(FlowFailure::new(
                    stage,
                    LedgerError::FlowAborted {
                        message: join_error.to_string(),
                    },
                ))
            }
        }
    }
}

/// Checks every party runs on a proposal before signing it
///
/// Contract rules come first so every party reports the same rule violation
/// for the same proposal.
pub(crate) fn verify_proposal(node: &Node, proposal: &Proposal) -> Result<(), LedgerError> {
    contract::validate(proposal)?;

    if !proposal.required_signers.contains(&node.party().key) {
        return Err(LedgerError::verification(format!(
            "{} is not a required signer",
            node.name()
        )));
    }
    resolve_inputs(node.vault(), proposal)
}

/// Every input must be a state this party recorded, unchanged
fn resolve_inputs(store: &dyn LedgerStore, proposal: &Proposal) -> Result<(), LedgerError> {
    for input in &proposal.inputs {
        match store.resolve(&input.state_ref)? {
            Some(state) if state == input.state => {}
            Some(_) => {
                return Err(LedgerError::verification(format!(
                    "input {} does not match the recorded state",
                    input.state_ref
                )))
            }
            None => {
                return Err(LedgerError::verification(format!(
                    "input {} is not known to this party",
                    input.state_ref
                )))
            }
        }
    }
    Ok(())
}

/// Local limit an acceptor applies on top of the contract
pub(crate) fn apply_acceptor_policy(
    config: &ProtocolConfig,
    proposal: &Proposal,
) -> Result<(), LedgerError> {
    let Some(max_value) = config.acceptor_max_value else {
        return Ok(());
    };
    match proposal.outputs.iter().find(|state| state.value > max_value) {
        Some(state) => Err(LedgerError::rule_violation(
            "acceptor_limit",
            &format!(
                "value {} exceeds the acceptor limit of {}",
                state.value, max_value
            ),
        )),
        None => Ok(()),
    }
}

/// Error for a checkpoint that lacks a field its stage requires
pub(crate) fn missing(field: &str, stage: ProtocolStage) -> LedgerError {
    LedgerError::checkpoint(format!("checkpoint at {} has no {}", stage, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::build;
    use crate::core::network::SimNetwork;
    use rstest::rstest;

    #[rstest]
    #[case::no_limit(None, 1_000_000, true)]
    #[case::under(Some(100), 100, true)]
    #[case::over(Some(100), 101, false)]
    fn test_acceptor_policy(
        #[case] limit: Option<i64>,
        #[case] value: i64,
        #[case] accepted: bool,
    ) {
        let network = SimNetwork::default();
        let a = network.create_node("PartyA").unwrap();
        let b = network.create_node("PartyB").unwrap();
        let proposal = build(value, a.party().clone(), b.party().clone(), network.notary_party());
        let config = ProtocolConfig {
            acceptor_max_value: limit,
            ..ProtocolConfig::default()
        };

        let result = apply_acceptor_policy(&config, &proposal);
        assert_eq!(result.is_ok(), accepted);
        if !accepted {
            assert_eq!(result.unwrap_err().rule_name(), Some("acceptor_limit"));
        }
    }

    #[test]
    fn test_outsider_cannot_sign() {
        let network = SimNetwork::default();
        let a = network.create_node("PartyA").unwrap();
        let b = network.create_node("PartyB").unwrap();
        let c = network.create_node("PartyC").unwrap();
        let proposal = build(5, a.party().clone(), b.party().clone(), network.notary_party());

        assert!(verify_proposal(&a, &proposal).is_ok());
        assert!(matches!(
            verify_proposal(&c, &proposal),
            Err(LedgerError::VerificationError { .. })
        ));
    }

    #[test]
    fn test_rule_violation_reported_before_membership() {
        let network = SimNetwork::default();
        let a = network.create_node("PartyA").unwrap();
        let b = network.create_node("PartyB").unwrap();
        let c = network.create_node("PartyC").unwrap();
        let proposal = build(-1, a.party().clone(), b.party().clone(), network.notary_party());

        for node in [&a, &b, &c] {
            let err = verify_proposal(node, &proposal).unwrap_err();
            assert_eq!(err.rule_name(), Some("positive_value"));
        }
    }
}

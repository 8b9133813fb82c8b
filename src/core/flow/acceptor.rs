//! Acceptor role
//!
//! Started by the arrival of a partially signed proposal. Nothing in the
//! message is trusted: signatures are checked against the recomputed hash and
//! the proposal is validated again from scratch before this party signs. The
//! checkpoint is written before any reply leaves the node.
//!
//! After signing, the acceptor waits for the initiator's finality broadcast and
//! records the same committed transaction, so both parties end with identical
//! ledgers even though only the initiator talks to the notary.

use tracing::{debug, info, warn};

use crate::core::checkpoint::Checkpoint;
use crate::core::flow::{apply_acceptor_policy, missing, verify_proposal};
use crate::core::network::{FlowMessage, FlowSession, Node};
use crate::crypto::TxHash;
use crate::types::{
    CommittedTransaction, FlowFailure, FlowRole, LedgerError, Party, ProtocolStage,
    SignedArtifact,
};

pub(crate) async fn run(
    node: Node,
    mut session: FlowSession,
    received: SignedArtifact,
) -> Result<CommittedTransaction, FlowFailure> {
    let entry = FlowRole::Acceptor.entry();
    let peer = session.peer().clone();
    let tx_id = received.id().map_err(|e| FlowFailure::new(entry, e))?;
    let existing = node
        .checkpoints()
        .find_in_flight(FlowRole::Acceptor, &tx_id)
        .map_err(|e| FlowFailure::new(entry, e))?;

    if let Err(error) = check_received(&node, &received, &peer) {
        // A bad resend must not disturb a flow that already signed
        let mut checkpoint = existing.unwrap_or_else(|| {
            Checkpoint::new(FlowRole::Acceptor, peer.clone(), received.proposal.clone())
        });
        if checkpoint.stage() == entry && checkpoint.artifact.is_none() {
            if let Err(save_error) = node.checkpoints().save(&checkpoint) {
                warn!(error = %save_error, "Could not persist acceptor checkpoint");
            }
            checkpoint.reject(error.to_string());
            if let Err(save_error) = node.checkpoints().save(&checkpoint) {
                warn!(error = %save_error, "Could not persist rejection");
            }
        }
        return Err(refuse(&session, entry, error));
    }

    let mut checkpoint = match existing {
        Some(checkpoint) => {
            debug!(flow_id = %checkpoint.flow_id, stage = %checkpoint.stage(), "Proposal received again");
            checkpoint
        }
        None => {
            let checkpoint =
                Checkpoint::new(FlowRole::Acceptor, peer.clone(), received.proposal.clone());
            save(&node, &checkpoint)?;
            checkpoint
        }
    };

    if checkpoint.stage() == ProtocolStage::Sent {
        checkpoint.advance(ProtocolStage::CounterpartyValidated);
        save(&node, &checkpoint)?;
    }
    if checkpoint.stage() == ProtocolStage::CounterpartyValidated {
        let mut signed = received.clone();
        node.sign(&mut signed)
            .map_err(|e| FlowFailure::new(checkpoint.stage(), e))?;
        checkpoint.artifact = Some(signed);
        checkpoint.advance(ProtocolStage::CounterpartySigned);
        save(&node, &checkpoint)?;
        info!(flow_id = %checkpoint.flow_id, tx = %tx_id.short(), peer = %peer.name, "Proposal signed");
    }

    let stage = checkpoint.stage();
    let signed = checkpoint
        .artifact
        .clone()
        .ok_or_else(|| FlowFailure::new(stage, missing("artifact", stage)))?;
    session
        .send(FlowMessage::ProposalWithAllSignatures(signed))
        .map_err(|e| FlowFailure::new(checkpoint.stage(), e))?;

    await_finality(&node, &mut session, checkpoint, tx_id).await
}

/// Record a committed transaction broadcast outside any running acceptor flow
///
/// Used when the initiator finalises over a fresh session, for example after
/// resuming from a checkpoint or when a finished transaction is resubmitted.
pub(crate) async fn receive_finality(
    node: Node,
    session: FlowSession,
    committed: CommittedTransaction,
) -> Result<(), LedgerError> {
    let tx_id = committed.id;
    if let Err(error) = check_committed(&node, &committed, tx_id) {
        session.send(FlowMessage::Rejected {
            stage: ProtocolStage::Finalizing,
            reason: error.to_string(),
        })?;
        return Err(error);
    }

    let finality = node.finality()?;
    if let Err(error) = finality.record_with_retry(node.vault(), &committed).await {
        session.send(FlowMessage::FinalityNack {
            tx_id,
            reason: error.to_string(),
        })?;
        return Err(error);
    }

    // Close out an acceptor flow that gave up waiting for this broadcast
    if let Some(mut checkpoint) = node
        .checkpoints()
        .find_in_flight(FlowRole::Acceptor, &tx_id)?
    {
        if checkpoint.stage() == ProtocolStage::CounterpartySigned {
            checkpoint.committed = Some(committed.clone());
            checkpoint.advance(ProtocolStage::Finalizing);
            node.checkpoints().save(&checkpoint)?;
        }
        if checkpoint.stage() == ProtocolStage::Finalizing {
            checkpoint.advance(ProtocolStage::Recorded);
            node.checkpoints().save(&checkpoint)?;
        }
    }

    session.send(FlowMessage::FinalityAck { tx_id })?;
    debug!(tx = %tx_id.short(), node = %node.name(), "Recorded broadcast transaction");
    Ok(())
}

async fn await_finality(
    node: &Node,
    session: &mut FlowSession,
    mut checkpoint: Checkpoint,
    tx_id: TxHash,
) -> Result<CommittedTransaction, FlowFailure> {
    loop {
        let stage = checkpoint.stage();
        let message = session
            .receive()
            .await
            .map_err(|e| FlowFailure::new(stage, e))?;

        match message {
            FlowMessage::FinalityBroadcast(committed) => {
                if let Err(error) = check_committed(node, &committed, tx_id) {
                    reject(node, &mut checkpoint, &error);
                    return Err(refuse(session, stage, error));
                }
                checkpoint.committed = Some(committed.clone());
                if stage == ProtocolStage::CounterpartySigned {
                    checkpoint.advance(ProtocolStage::Finalizing);
                }
                save(node, &checkpoint)?;

                let finality = node
                    .finality()
                    .map_err(|e| FlowFailure::new(stage, e))?;
                match finality.record_with_retry(node.vault(), &committed).await {
                    Ok(_) => {
                        checkpoint.advance(ProtocolStage::Recorded);
                        save(node, &checkpoint)?;
                        if let Err(error) = session.send(FlowMessage::FinalityAck { tx_id }) {
                            warn!(flow_id = %checkpoint.flow_id, %error, "Acknowledgement not delivered");
                        }
                        info!(flow_id = %checkpoint.flow_id, tx = %tx_id.short(), "Agreement recorded");
                        return Ok(committed);
                    }
                    Err(error) => {
                        warn!(flow_id = %checkpoint.flow_id, %error, "Could not record, asking for resend");
                        session
                            .send(FlowMessage::FinalityNack {
                                tx_id,
                                reason: error.to_string(),
                            })
                            .map_err(|e| FlowFailure::new(checkpoint.stage(), e))?;
                    }
                }
            }
            FlowMessage::Rejected { reason, .. } => {
                let error = LedgerError::verification(format!(
                    "{} abandoned the agreement: {}",
                    session.peer().name,
                    reason
                ));
                reject(node, &mut checkpoint, &error);
                return Err(FlowFailure::new(stage, error));
            }
            other => {
                let error = LedgerError::verification(format!(
                    "unexpected {} while awaiting finality",
                    other.kind()
                ));
                reject(node, &mut checkpoint, &error);
                return Err(refuse(session, stage, error));
            }
        }
    }
}

/// Everything this party checks before adding its signature
fn check_received(
    node: &Node,
    received: &SignedArtifact,
    initiator: &Party,
) -> Result<(), LedgerError> {
    received.verify_signatures()?;
    if !received.is_signed_by(&initiator.key) {
        return Err(LedgerError::verification(format!(
            "proposal is not signed by its sender {}",
            initiator.name
        )));
    }
    verify_proposal(node, &received.proposal)?;
    apply_acceptor_policy(node.config(), &received.proposal)
}

fn check_committed(
    node: &Node,
    committed: &CommittedTransaction,
    expected: TxHash,
) -> Result<(), LedgerError> {
    committed.verify()?;
    if committed.id != expected {
        return Err(LedgerError::verification(format!(
            "expected transaction {} but received {}",
            expected.short(),
            committed.id.short()
        )));
    }
    if !committed
        .proposal()
        .required_signers
        .contains(&node.party().key)
    {
        return Err(LedgerError::verification(format!(
            "{} is not a participant of transaction {}",
            node.name(),
            committed.id.short()
        )));
    }
    Ok(())
}

fn save(node: &Node, checkpoint: &Checkpoint) -> Result<(), FlowFailure> {
    node.checkpoints()
        .save(checkpoint)
        .map_err(|e| FlowFailure::new(checkpoint.stage(), e))
}

fn reject(node: &Node, checkpoint: &mut Checkpoint, error: &LedgerError) {
    checkpoint.reject(error.to_string());
    if let Err(save_error) = node.checkpoints().save(checkpoint) {
        warn!(flow_id = %checkpoint.flow_id, error = %save_error, "Could not persist rejection");
    }
}

/// Tell the initiator this party will not continue, then fail
fn refuse(session: &FlowSession, stage: ProtocolStage, error: LedgerError) -> FlowFailure {
    info!(peer = %session.peer().name, %stage, %error, "Refusing proposal");
    if let Err(send_error) = session.send(FlowMessage::Rejected {
        stage,
        reason: error.to_string(),
    }) {
        debug!(error = %send_error, "Rejection notice not delivered");
    }
    FlowFailure::new(stage, error)
}

//! Initiator role
//!
//! An explicit state machine over the initiator path. Each iteration performs
//! the work of the current stage, moves the checkpoint to the next stage and
//! saves it, so a flow resumed from any checkpoint continues where it stopped.
//!
//! # Failure handling
//!
//! Transport and storage failures leave the checkpoint where it is; the flow
//! can be resumed later with the identical proposal. So does any failure at
//! `Finalizing`: the notary has already committed the transaction there, and
//! the counterparty still has to be brought level. Every other failure is a
//! verdict: the checkpoint becomes `Rejected` and, once the counterparty has
//! seen the proposal, it is told so it stops waiting.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::checkpoint::Checkpoint;
use crate::core::flow::{missing, verify_proposal};
use crate::core::network::{FlowMessage, FlowSession, Node};
use crate::types::{
    CommittedTransaction, FlowFailure, LedgerError, ProtocolStage, ProtocolState, SignedArtifact,
};

pub(crate) async fn run(
    node: Node,
    mut checkpoint: Checkpoint,
    fresh: bool,
    cancel: CancellationToken,
) -> Result<CommittedTransaction, FlowFailure> {
    if fresh {
        node.checkpoints()
            .save(&checkpoint)
            .map_err(|e| FlowFailure::new(checkpoint.stage(), e))?;
    }
    let mut session: Option<FlowSession> = None;

    loop {
        let stage = match &checkpoint.state {
            ProtocolState::Active(ProtocolStage::Recorded) => {
                let stage = ProtocolStage::Recorded;
                return checkpoint
                    .committed
                    .clone()
                    .ok_or_else(|| FlowFailure::new(stage, missing("committed transaction", stage)));
            }
            ProtocolState::Active(stage) => *stage,
            ProtocolState::Rejected { stage, reason } => {
                return Err(FlowFailure::new(
                    *stage,
                    LedgerError::FlowAborted {
                        message: reason.clone(),
                    },
                ));
            }
        };

        match step(&node, &mut checkpoint, &mut session, &cancel).await {
            Ok(next) => {
                checkpoint.advance(next);
                node.checkpoints()
                    .save(&checkpoint)
                    .map_err(|e| FlowFailure::new(stage, e))?;
                debug!(flow_id = %checkpoint.flow_id, stage = %next, "Checkpoint saved");
            }
            Err(error) => return Err(fail(&node, &mut checkpoint, session.as_ref(), error)),
        }
    }
}

async fn step(
    node: &Node,
    checkpoint: &mut Checkpoint,
    session: &mut Option<FlowSession>,
    cancel: &CancellationToken,
) -> Result<ProtocolStage, LedgerError> {
    let stage = checkpoint.stage();
    match stage {
        ProtocolStage::Built => {
            ensure_not_cancelled(checkpoint, cancel)?;
            verify_proposal(node, &checkpoint.proposal)?;
            Ok(ProtocolStage::LocallyValidated)
        }
        ProtocolStage::LocallyValidated => {
            ensure_not_cancelled(checkpoint, cancel)?;
            let mut artifact = SignedArtifact::new(checkpoint.proposal.clone());
            node.sign(&mut artifact)?;
            checkpoint.artifact = Some(artifact);
            Ok(ProtocolStage::InitiatorSigned)
        }
        ProtocolStage::InitiatorSigned => {
            *session = Some(send_proposal(node, checkpoint)?);
            Ok(ProtocolStage::Sent)
        }
        ProtocolStage::Sent => {
            // Resumed: the acceptor re-signs deterministically
            if session.is_none() {
                *session = Some(send_proposal(node, checkpoint)?);
            }
            let Some(session) = session.as_mut() else {
                return Err(missing("session", stage));
            };
            let peer = session.peer().name.clone();
            match session.receive().await? {
                FlowMessage::ProposalWithAllSignatures(returned) => {
                    if returned.proposal != checkpoint.proposal {
                        return Err(LedgerError::verification(format!(
                            "{} returned a different proposal",
                            peer
                        )));
                    }
                    returned.verify_signatures()?;
                    checkpoint.received = Some(returned);
                    Ok(ProtocolStage::CounterpartySigned)
                }
                FlowMessage::Rejected { reason, .. } => Err(LedgerError::verification(format!(
                    "{} rejected the proposal: {}",
                    peer, reason
                ))),
                other => Err(LedgerError::verification(format!(
                    "unexpected {} from {}",
                    other.kind(),
                    peer
                ))),
            }
        }
        ProtocolStage::CounterpartySigned => {
            let mut merged = checkpoint
                .artifact
                .clone()
                .ok_or_else(|| missing("artifact", stage))?;
            let received = checkpoint
                .received
                .as_ref()
                .ok_or_else(|| missing("counterparty artifact", stage))?;
            merged.merge(received)?;
            merged.verify_complete()?;
            checkpoint.artifact = Some(merged);
            Ok(ProtocolStage::Merged)
        }
        ProtocolStage::Merged => {
            let artifact = checkpoint
                .artifact
                .as_ref()
                .ok_or_else(|| missing("artifact", stage))?;
            let committed = node.finality()?.notarise(artifact)?;
            info!(flow_id = %checkpoint.flow_id, tx = %committed.id.short(), "Notarised");
            checkpoint.committed = Some(committed);
            Ok(ProtocolStage::Finalizing)
        }
        ProtocolStage::Finalizing => {
            let committed = checkpoint
                .committed
                .clone()
                .ok_or_else(|| missing("committed transaction", stage))?;
            let finality = node.finality()?;
            finality.record_with_retry(node.vault(), &committed).await?;

            if session.is_none() {
                *session = Some(node.initiate_session(&checkpoint.counterparty));
            }
            let Some(session) = session.as_mut() else {
                return Err(missing("session", stage));
            };
            finality.distribute(session, &committed).await?;
            info!(flow_id = %checkpoint.flow_id, tx = %committed.id.short(), "Agreement recorded");
            Ok(ProtocolStage::Recorded)
        }
        other => Err(LedgerError::checkpoint(format!(
            "initiator has no work at {}",
            other
        ))),
    }
}

fn ensure_not_cancelled(
    checkpoint: &Checkpoint,
    cancel: &CancellationToken,
) -> Result<(), LedgerError> {
    if cancel.is_cancelled() {
        return Err(LedgerError::Cancelled {
            flow_id: checkpoint.flow_id.to_string(),
        });
    }
    Ok(())
}

fn send_proposal(node: &Node, checkpoint: &Checkpoint) -> Result<FlowSession, LedgerError> {
    let artifact = checkpoint
        .artifact
        .clone()
        .ok_or_else(|| missing("artifact", checkpoint.stage()))?;
    let session = node.initiate_session(&checkpoint.counterparty);
    session.send(FlowMessage::ProposalWithPartialSignatures(artifact))?;
    debug!(
        flow_id = %checkpoint.flow_id,
        session = %session.id(),
        peer = %checkpoint.counterparty.name,
        "Proposal sent"
    );
    Ok(session)
}

fn fail(
    node: &Node,
    checkpoint: &mut Checkpoint,
    session: Option<&FlowSession>,
    error: LedgerError,
) -> FlowFailure {
    let stage = checkpoint.stage();
    match error {
        LedgerError::TransportFailure { .. } | LedgerError::StorageError { .. } => {
            warn!(flow_id = %checkpoint.flow_id, %stage, %error, "Flow suspended, resumable");
            return FlowFailure::new(stage, error);
        }
        LedgerError::CheckpointError { .. } => {
            warn!(flow_id = %checkpoint.flow_id, %stage, %error, "Checkpoint corrupt");
            return FlowFailure::new(stage, error);
        }
        _ if stage == ProtocolStage::Finalizing => {
            warn!(flow_id = %checkpoint.flow_id, %stage, %error, "Committed but not recorded everywhere, resumable");
            return FlowFailure::new(stage, error);
        }
        _ => {}
    }

    let reason = error.to_string();
    checkpoint.reject(reason.clone());
    if let Err(save_error) = node.checkpoints().save(checkpoint) {
        warn!(flow_id = %checkpoint.flow_id, error = %save_error, "Could not persist rejection");
    }
    if let Some(session) = session {
        if let Err(send_error) = session.send(FlowMessage::Rejected {
            stage,
            reason: reason.clone(),
        }) {
            debug!(flow_id = %checkpoint.flow_id, error = %send_error, "Rejection notice not delivered");
        }
    }
    info!(flow_id = %checkpoint.flow_id, %stage, %reason, "Agreement rejected");
    FlowFailure::new(stage, error)
}

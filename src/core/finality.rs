//! Finality and recording
//!
//! Turns a fully signed artifact into a committed transaction and makes sure
//! every participant holds it. Recording is retried rather than skipped: a flow
//! does not report success until each participant acknowledged the write.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::config::ProtocolConfig;
use crate::core::network::{FlowMessage, FlowSession};
use crate::core::notary::Notary;
use crate::core::traits::{LedgerStore, RecordOutcome};
use crate::types::{CommittedTransaction, LedgerError, SignedArtifact};

/// Notarisation plus durable recording
#[derive(Debug, Clone)]
pub struct FinalityService {
    notary: Arc<Notary>,
    config: ProtocolConfig,
}

impl FinalityService {
    pub fn new(notary: Arc<Notary>, config: ProtocolConfig) -> Self {
        FinalityService { notary, config }
    }

    /// Order `artifact` with the notary and seal it with the notary's signature
    ///
    /// Fails with `VerificationError` if a signature is missing or invalid or
    /// the artifact names a different notary, and with `ConflictError` if an
    /// input was already consumed by another transaction.
    pub fn notarise(&self, artifact: &SignedArtifact) -> Result<CommittedTransaction, LedgerError> {
        let tx_id = artifact.verify_complete()?;
        let named = &artifact.proposal.notary;
        if named.key != self.notary.party().key {
            return Err(LedgerError::verification(format!(
                "transaction {} names notary {} which does not serve this network",
                tx_id.short(),
                named.name
            )));
        }
        let signature = self
            .notary
            .notarize(&artifact.proposal.input_refs(), tx_id)?;
        CommittedTransaction::new(artifact.clone(), signature)
    }

    /// Record `committed` in `store`, retrying storage failures
    pub async fn record_with_retry(
        &self,
        store: &dyn LedgerStore,
        committed: &CommittedTransaction,
    ) -> Result<RecordOutcome, LedgerError> {
        let mut attempt = 1;
        loop {
            match store.record(committed) {
                Ok(outcome) => return Ok(outcome),
                Err(error @ LedgerError::StorageError { .. })
                    if attempt < self.config.record_attempts =>
                {
                    warn!(
                        tx = %committed.id.short(),
                        attempt,
                        %error,
                        "Record failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.record_backoff).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Send `committed` over `session` until the peer acknowledges recording it
    ///
    /// A negative acknowledgement triggers a resend, up to the configured
    /// number of record attempts.
    pub async fn distribute(
        &self,
        session: &mut FlowSession,
        committed: &CommittedTransaction,
    ) -> Result<(), LedgerError> {
        let peer = session.peer().name.clone();
        let mut attempt = 1;
        loop {
            session.send(FlowMessage::FinalityBroadcast(committed.clone()))?;
            match session.receive().await? {
                FlowMessage::FinalityAck { tx_id } if tx_id == committed.id => {
                    info!(tx = %committed.id.short(), %peer, "Recorded by peer");
                    return Ok(());
                }
                FlowMessage::FinalityNack { tx_id, reason } if tx_id == committed.id => {
                    if attempt >= self.config.record_attempts {
                        return Err(LedgerError::storage(
                            &format!("record at {}", peer),
                            reason,
                        ));
                    }
                    debug!(tx = %committed.id.short(), %peer, attempt, %reason, "Peer failed to record");
                    attempt += 1;
                    tokio::time::sleep(self.config.record_backoff).await;
                }
                FlowMessage::Rejected { reason, .. } => {
                    return Err(LedgerError::verification(format!(
                        "{} refused the committed transaction: {}",
                        peer, reason
                    )));
                }
                other => {
                    return Err(LedgerError::verification(format!(
                        "unexpected {} from {} during finality",
                        other.kind(),
                        peer
                    )));
                }
            }
        }
    }
}

//! Agreement engine
//!
//! Drives batch requests through a simulated network. Each request names its
//! parties by network name; the engine creates missing nodes on first use and
//! starts the matching flow:
//!
//! - `issue`: the lender's node proposes a new obligation to the borrower
//! - `settle`: the borrower's node consumes the first outstanding obligation
//!   with the same lender and value
//!
//! Requests with the same lender and borrower must be processed in input order;
//! the engine itself holds no ordering state and is safe to share across tasks.

use tracing::debug;

use crate::core::config::ProtocolConfig;
use crate::core::network::SimNetwork;
use crate::types::{
    AgreementRequest, CommittedTransaction, FlowFailure, LedgerError, ObligationState,
    ProtocolStage, RequestAction,
};

/// An obligation as seen from one participant's vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    /// Name of the node whose vault holds the state
    pub holder: String,
    pub obligation: ObligationState,
}

/// Request processor over a simulated network
#[derive(Debug, Clone)]
pub struct AgreementEngine {
    network: SimNetwork,
}

impl AgreementEngine {
    pub fn new(config: ProtocolConfig) -> Self {
        Self::with_network(SimNetwork::new(config))
    }

    pub fn with_network(network: SimNetwork) -> Self {
        AgreementEngine { network }
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// Run one request to completion
    ///
    /// Failures to resolve parties or find the obligation to settle are
    /// reported at the `BUILT` stage, before any flow starts.
    pub async fn process(
        &self,
        request: &AgreementRequest,
    ) -> Result<CommittedTransaction, FlowFailure> {
        let before_flow = |error: LedgerError| FlowFailure::new(ProtocolStage::Built, error);

        let handle = match request.action {
            RequestAction::Issue => {
                let lender = self
                    .network
                    .node_or_create(&request.lender)
                    .map_err(before_flow)?;
                let borrower = self
                    .network
                    .node_or_create(&request.borrower)
                    .map_err(before_flow)?;
                lender
                    .start_issue(request.value, borrower.party())
                    .map_err(before_flow)?
            }
            RequestAction::Settle => {
                let borrower = self.network.node(&request.borrower).map_err(before_flow)?;
                let lender = self.network.node(&request.lender).map_err(before_flow)?;
                let outstanding = borrower
                    .obligations()
                    .map_err(before_flow)?
                    .into_iter()
                    .find(|held| {
                        held.state.lender.key == lender.party().key
                            && held.state.borrower.key == borrower.party().key
                            && held.state.value == request.value
                    })
                    .ok_or_else(|| {
                        before_flow(LedgerError::verification(format!(
                            "no outstanding obligation of {} from {} to {}",
                            request.value, request.borrower, request.lender
                        )))
                    })?;
                borrower.start_settle(outstanding).map_err(before_flow)?
            }
        };

        debug!(flow_id = %handle.flow_id(), action = ?request.action, "Flow started");
        handle.result().await
    }

    /// Every unconsumed obligation in every vault
    pub fn holdings(&self) -> Result<Vec<Holding>, LedgerError> {
        let mut holdings = Vec::new();
        for node in self.network.nodes() {
            for held in node.obligations()? {
                holdings.push(Holding {
                    holder: node.name().to_string(),
                    obligation: held.state,
                });
            }
        }
        Ok(holdings)
    }
}

impl Default for AgreementEngine {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::LedgerStore;

    fn request(action: RequestAction, lender: &str, borrower: &str, value: i64) -> AgreementRequest {
        AgreementRequest {
            action,
            lender: lender.to_string(),
            borrower: borrower.to_string(),
            value,
        }
    }

    #[tokio::test]
    async fn test_issue_creates_nodes_and_records_at_both() {
        let engine = AgreementEngine::default();
        let committed = engine
            .process(&request(RequestAction::Issue, "PartyA", "PartyB", 10))
            .await
            .unwrap();

        let holdings = engine.holdings().unwrap();
        assert_eq!(holdings.len(), 2);
        assert!(holdings.iter().all(|h| h.obligation.value == 10));
        assert_eq!(
            engine
                .network()
                .node("PartyB")
                .unwrap()
                .vault()
                .transaction(&committed.id)
                .unwrap(),
            Some(committed)
        );
    }

    #[tokio::test]
    async fn test_settle_consumes_matching_obligation() {
        let engine = AgreementEngine::default();
        engine
            .process(&request(RequestAction::Issue, "PartyA", "PartyB", 10))
            .await
            .unwrap();
        engine
            .process(&request(RequestAction::Issue, "PartyA", "PartyB", 20))
            .await
            .unwrap();
        engine
            .process(&request(RequestAction::Settle, "PartyA", "PartyB", 10))
            .await
            .unwrap();

        let holdings = engine.holdings().unwrap();
        assert_eq!(holdings.len(), 2);
        assert!(holdings.iter().all(|h| h.obligation.value == 20));
    }

    #[tokio::test]
    async fn test_settle_without_obligation_fails_before_flow() {
        let engine = AgreementEngine::default();
        engine
            .process(&request(RequestAction::Issue, "PartyA", "PartyB", 10))
            .await
            .unwrap();

        let failure = engine
            .process(&request(RequestAction::Settle, "PartyA", "PartyB", 99))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, ProtocolStage::Built);
        assert!(matches!(failure.error, LedgerError::VerificationError { .. }));
    }

    #[tokio::test]
    async fn test_settle_with_unknown_party() {
        let engine = AgreementEngine::default();
        let failure = engine
            .process(&request(RequestAction::Settle, "PartyA", "PartyB", 1))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, LedgerError::UnknownParty { .. }));
    }

    #[tokio::test]
    async fn test_invalid_issue_records_nothing() {
        let engine = AgreementEngine::default();
        let failure = engine
            .process(&request(RequestAction::Issue, "PartyA", "PartyB", -1))
            .await
            .unwrap_err();

        assert_eq!(failure.error.rule_name(), Some("positive_value"));
        assert!(engine.holdings().unwrap().is_empty());
    }
}
